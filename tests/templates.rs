use mutation_interpreter::{
    BoundaryValue, Document, DomEdit, EditError, Interpreter, InterpreterConfig, NodeId,
};

fn mounted() -> Interpreter {
    let document = Document::new();
    let body = document.body();
    let mut interp = Interpreter::new(document, &InterpreterConfig::default());
    interp
        .apply_batch(&[DomEdit::SetNode {
            id: NodeId(1),
            value: BoundaryValue::from(body),
        }])
        .expect("seed body");
    interp
}

fn card_definition(name: &str) -> Vec<DomEdit> {
    vec![
        DomEdit::CreateElement {
            tag: "article".into(),
            id: NodeId(10),
        },
        DomEdit::CreateElement {
            tag: "h2".into(),
            id: NodeId(11),
        },
        DomEdit::CreatePlaceholder { id: NodeId(12) },
        DomEdit::AppendChildren { count: 2 },
        DomEdit::SaveTemplate {
            name: name.into(),
            count: 1,
        },
    ]
}

fn stamp_card(root_id: u64, title: &str, body: &str) -> Vec<DomEdit> {
    vec![
        DomEdit::PushRoot { id: NodeId(1) },
        DomEdit::LoadTemplate {
            name: "card".into(),
            index: 0,
            id: NodeId(root_id),
        },
        DomEdit::AssignId {
            path: vec![0],
            id: NodeId(root_id + 1),
        },
        DomEdit::SetText {
            id: NodeId(root_id + 1),
            text: title.into(),
        },
        DomEdit::CreateTextNode {
            text: body.into(),
            id: NodeId(root_id + 2),
        },
        DomEdit::ReplacePlaceholder {
            path: vec![1],
            count: 1,
        },
        DomEdit::AppendChildren { count: 1 },
        DomEdit::PopRoot,
    ]
}

#[test]
fn save_template_releases_ids_and_keeps_canonical_copy() {
    let mut interp = mounted();
    interp
        .apply_batch(&card_definition("card"))
        .expect("template saved");

    assert!(interp.templates().contains("card"));
    for raw in 10..=12 {
        assert!(
            !interp.node_table().contains(NodeId(raw)),
            "id {raw} should be free after saving"
        );
    }
    let canonical = interp.templates().canonical("card").unwrap();
    assert_eq!(
        interp.document().inner_html(canonical),
        "<article><h2></h2><!--placeholder--></article>"
    );
}

#[test]
fn load_template_stamps_fresh_clones() {
    let mut interp = mounted();
    interp.apply_batch(&card_definition("card")).unwrap();
    interp
        .apply_batch(&stamp_card(20, "First", "one"))
        .expect("first stamp");
    interp
        .apply_batch(&stamp_card(30, "Second", "two"))
        .expect("second stamp");

    let body = interp.document().body();
    assert_eq!(
        interp.document().inner_html(body),
        "<article><h2>First</h2>one</article><article><h2>Second</h2>two</article>"
    );
    assert_ne!(interp.node(NodeId(20)), interp.node(NodeId(30)));

    let canonical = interp.templates().canonical("card").unwrap();
    assert_eq!(
        interp.document().inner_html(canonical),
        "<article><h2></h2><!--placeholder--></article>",
        "stamping must not touch the canonical copy"
    );
}

#[test]
fn template_redefinition_is_rejected() {
    let mut interp = mounted();
    interp.apply_batch(&card_definition("card")).unwrap();
    interp
        .apply_batch(&card_definition("card"))
        .expect("identical re-registration is a no-op");
    assert_eq!(interp.templates().len(), 1);

    let err = interp
        .apply_batch(&[
            DomEdit::CreateElement {
                tag: "aside".into(),
                id: NodeId(10),
            },
            DomEdit::SaveTemplate {
                name: "card".into(),
                count: 1,
            },
        ])
        .unwrap_err();
    assert_eq!(err.source, EditError::TemplateRedefinition("card".into()));
}

#[test]
fn template_errors_surface_with_context() {
    let mut interp = mounted();
    let err = interp
        .apply_batch(&[DomEdit::LoadTemplate {
            name: "missing".into(),
            index: 0,
            id: NodeId(5),
        }])
        .unwrap_err();
    assert_eq!(err.source, EditError::UnknownTemplate("missing".into()));
    assert_eq!(err.opcode, "load_template");

    interp.apply_batch(&card_definition("card")).unwrap();
    let err = interp
        .apply_batch(&[
            DomEdit::LoadTemplate {
                name: "card".into(),
                index: 0,
                id: NodeId(5),
            },
            DomEdit::AssignId {
                path: vec![4, 0],
                id: NodeId(6),
            },
        ])
        .unwrap_err();
    assert_eq!(err.index, 1);
    assert_eq!(err.source, EditError::InvalidPath(vec![4, 0]));
}
