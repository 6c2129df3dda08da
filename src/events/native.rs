//! Platform events as captured at the root listener, and their normalization
//! into the flat field map reported to the engine.

use blitz_traits::events::{BlitzMouseButtonEvent, MouseEventButton, MouseEventButtons};
use keyboard_types::{Code, Key, Location, Modifiers};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::dom::{Document, NodeHandle};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no field mapping for '{0}' events; reporting generic fields only")]
    UnsupportedEventType(String),
}

/// A native event delivered to a root listener.
#[derive(Debug, Clone)]
pub struct NativeEvent {
    pub name: String,
    pub target: NodeHandle,
    pub data: EventData,
}

impl NativeEvent {
    pub fn new(name: impl Into<String>, target: NodeHandle, data: EventData) -> Self {
        Self {
            name: name.into(),
            target,
            data,
        }
    }
}

/// Event category decided once, at capture time.
#[derive(Debug, Clone)]
pub enum EventData {
    Keyboard(KeyboardData),
    Mouse(MouseData),
    Pointer(PointerData),
    Wheel(WheelData),
    Touch(TouchData),
    Composition(CompositionData),
    /// Values are read from the live target element when normalizing.
    Form,
    Transition(TransitionData),
    Animation(AnimationData),
    Focus,
    Generic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardData {
    pub key: Key,
    pub code: Code,
    pub location: Location,
    pub repeat: bool,
    pub is_composing: bool,
    pub modifiers: Modifiers,
}

impl KeyboardData {
    pub fn new(key: Key, code: Code) -> Self {
        Self {
            key,
            code,
            location: Location::Standard,
            repeat: false,
            is_composing: false,
            modifiers: Modifiers::empty(),
        }
    }
}

/// Mouse payload: the blitz button event (client coordinates, buttons,
/// modifiers) plus the page and screen positions.
#[derive(Debug, Clone)]
pub struct MouseData {
    pub event: BlitzMouseButtonEvent,
    pub page_x: f64,
    pub page_y: f64,
    pub screen_x: f64,
    pub screen_y: f64,
}

impl MouseData {
    /// Main button, no modifiers, every coordinate pair at `(x, y)`.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            event: BlitzMouseButtonEvent {
                x: x.into(),
                y: y.into(),
                button: MouseEventButton::Main,
                buttons: MouseEventButtons::empty(),
                mods: Modifiers::empty(),
            },
            page_x: f64::from(x),
            page_y: f64::from(y),
            screen_x: f64::from(x),
            screen_y: f64::from(y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointerData {
    pub mouse: MouseData,
    pub pointer_id: i32,
    pub width: f64,
    pub height: f64,
    pub pressure: f64,
    pub tangential_pressure: f64,
    pub tilt_x: i32,
    pub tilt_y: i32,
    pub twist: i32,
    pub pointer_type: String,
    pub is_primary: bool,
}

impl PointerData {
    pub fn mouse(mouse: MouseData) -> Self {
        Self {
            mouse,
            pointer_id: 1,
            width: 1.0,
            height: 1.0,
            pressure: 0.5,
            tangential_pressure: 0.0,
            tilt_x: 0,
            tilt_y: 0,
            twist: 0,
            pointer_type: "mouse".to_string(),
            is_primary: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaMode {
    #[default]
    Pixel,
    Line,
    Page,
}

#[derive(Debug, Clone)]
pub struct WheelData {
    pub mouse: MouseData,
    pub delta_x: f64,
    pub delta_y: f64,
    pub delta_z: f64,
    pub delta_mode: DeltaMode,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TouchData {
    pub modifiers: Modifiers,
    pub touches: usize,
    pub changed_touches: usize,
    pub target_touches: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositionData {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionData {
    pub property_name: String,
    pub elapsed_time: f64,
    pub pseudo_element: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationData {
    pub animation_name: String,
    pub elapsed_time: f64,
    pub pseudo_element: String,
}

/// Builds the reported field map for `event`.
///
/// Generic fields are always present. The error is informational: the map is
/// still usable when a category has no dedicated mapping.
pub fn normalize(
    event: &NativeEvent,
    document: &Document,
) -> (JsonMap<String, JsonValue>, Option<NormalizeError>) {
    let mut map = JsonMap::new();
    map.insert("type".to_string(), JsonValue::String(event.name.clone()));

    match &event.data {
        EventData::Keyboard(data) => insert_key_event(&mut map, &event.name, data),
        EventData::Mouse(data) => insert_mouse_event(&mut map, data),
        EventData::Pointer(data) => insert_pointer_event(&mut map, data),
        EventData::Wheel(data) => {
            insert_mouse_event(&mut map, &data.mouse);
            map.insert("deltaX".to_string(), json!(data.delta_x));
            map.insert("deltaY".to_string(), json!(data.delta_y));
            map.insert("deltaZ".to_string(), json!(data.delta_z));
            map.insert("deltaMode".to_string(), json!(delta_mode_code(data.delta_mode)));
        }
        EventData::Touch(data) => {
            insert_modifier_flags(&mut map, &data.modifiers);
            map.insert("touches".to_string(), json!(data.touches));
            map.insert("changedTouches".to_string(), json!(data.changed_touches));
            map.insert("targetTouches".to_string(), json!(data.target_touches));
        }
        EventData::Composition(data) => {
            map.insert("data".to_string(), JsonValue::String(data.data.clone()));
        }
        EventData::Form => insert_form_values(&mut map, document, event.target),
        EventData::Transition(data) => {
            map.insert(
                "propertyName".to_string(),
                JsonValue::String(data.property_name.clone()),
            );
            map.insert("elapsedTime".to_string(), json!(data.elapsed_time));
            map.insert(
                "pseudoElement".to_string(),
                JsonValue::String(data.pseudo_element.clone()),
            );
        }
        EventData::Animation(data) => {
            map.insert(
                "animationName".to_string(),
                JsonValue::String(data.animation_name.clone()),
            );
            map.insert("elapsedTime".to_string(), json!(data.elapsed_time));
            map.insert(
                "pseudoElement".to_string(),
                JsonValue::String(data.pseudo_element.clone()),
            );
        }
        EventData::Focus => {}
        EventData::Generic => {
            return (
                map,
                Some(NormalizeError::UnsupportedEventType(event.name.clone())),
            );
        }
    }

    (map, None)
}

fn insert_mouse_event(map: &mut JsonMap<String, JsonValue>, data: &MouseData) {
    let event = &data.event;
    map.insert("clientX".to_string(), json!(event.x));
    map.insert("clientY".to_string(), json!(event.y));
    map.insert("x".to_string(), json!(event.x));
    map.insert("y".to_string(), json!(event.y));
    map.insert("pageX".to_string(), json!(data.page_x));
    map.insert("pageY".to_string(), json!(data.page_y));
    map.insert("screenX".to_string(), json!(data.screen_x));
    map.insert("screenY".to_string(), json!(data.screen_y));
    map.insert("button".to_string(), json!(mouse_button_code(event.button)));
    map.insert("buttons".to_string(), json!(event.buttons.bits()));
    insert_modifier_flags(map, &event.mods);
}

fn insert_pointer_event(map: &mut JsonMap<String, JsonValue>, event: &PointerData) {
    insert_mouse_event(map, &event.mouse);
    map.insert("pointerId".to_string(), json!(event.pointer_id));
    map.insert("width".to_string(), json!(event.width));
    map.insert("height".to_string(), json!(event.height));
    map.insert("pressure".to_string(), json!(event.pressure));
    map.insert(
        "tangentialPressure".to_string(),
        json!(event.tangential_pressure),
    );
    map.insert("tiltX".to_string(), json!(event.tilt_x));
    map.insert("tiltY".to_string(), json!(event.tilt_y));
    map.insert("twist".to_string(), json!(event.twist));
    map.insert(
        "pointerType".to_string(),
        JsonValue::String(event.pointer_type.clone()),
    );
    map.insert("isPrimary".to_string(), JsonValue::Bool(event.is_primary));
}

fn insert_key_event(map: &mut JsonMap<String, JsonValue>, name: &str, event: &KeyboardData) {
    insert_modifier_flags(map, &event.modifiers);
    map.insert("key".to_string(), JsonValue::String(event.key.to_string()));
    map.insert(
        "code".to_string(),
        JsonValue::String(event.code.to_string()),
    );
    map.insert("location".to_string(), json!(location_code(event.location)));
    map.insert("repeat".to_string(), JsonValue::Bool(event.repeat));
    map.insert(
        "isComposing".to_string(),
        JsonValue::Bool(event.is_composing),
    );

    let key_code = legacy_key_code(&event.key);
    let char_code = if name == "keypress" {
        legacy_char_code(&event.key)
    } else {
        0
    };
    map.insert("keyCode".to_string(), json!(key_code));
    map.insert("charCode".to_string(), json!(char_code));
    map.insert(
        "which".to_string(),
        json!(if char_code != 0 { char_code } else { key_code }),
    );
}

fn insert_modifier_flags(map: &mut JsonMap<String, JsonValue>, mods: &Modifiers) {
    map.insert("altKey".to_string(), JsonValue::Bool(mods.alt()));
    map.insert("ctrlKey".to_string(), JsonValue::Bool(mods.ctrl()));
    map.insert("metaKey".to_string(), JsonValue::Bool(mods.meta()));
    map.insert("shiftKey".to_string(), JsonValue::Bool(mods.shift()));
}

fn insert_form_values(map: &mut JsonMap<String, JsonValue>, document: &Document, target: NodeHandle) {
    if document.tag_name(target) == Some("form") {
        let mut values = JsonMap::new();
        for node in document.descendants(target) {
            let Some(name) = document.attribute(node, "name") else {
                continue;
            };
            if !is_form_control(document, node) {
                continue;
            }
            if is_checkable(document, node) && document.attribute(node, "checked").is_none() {
                continue;
            }
            values.insert(
                name.to_string(),
                JsonValue::String(control_value(document, node)),
            );
        }
        map.insert("values".to_string(), JsonValue::Object(values));
        return;
    }

    map.insert(
        "value".to_string(),
        JsonValue::String(control_value(document, target)),
    );
    if is_checkable(document, target) {
        map.insert(
            "checked".to_string(),
            JsonValue::Bool(document.attribute(target, "checked").is_some()),
        );
    }
}

fn is_form_control(document: &Document, node: NodeHandle) -> bool {
    matches!(
        document.tag_name(node),
        Some("input") | Some("select") | Some("textarea")
    )
}

fn is_checkable(document: &Document, node: NodeHandle) -> bool {
    document.tag_name(node) == Some("input")
        && matches!(
            document.attribute(node, "type"),
            Some("checkbox") | Some("radio")
        )
}

fn control_value(document: &Document, node: NodeHandle) -> String {
    match document.tag_name(node) {
        Some("textarea") => document.text_content(node),
        Some("select") => {
            let options: Vec<NodeHandle> = document
                .descendants(node)
                .into_iter()
                .filter(|option| document.tag_name(*option) == Some("option"))
                .collect();
            options
                .iter()
                .find(|option| document.attribute(**option, "selected").is_some())
                .or_else(|| options.first())
                .map(|option| option_value(document, *option))
                .unwrap_or_default()
        }
        Some("input") => match document.attribute(node, "value") {
            Some(value) => value.to_string(),
            None if is_checkable(document, node) => "on".to_string(),
            None => String::new(),
        },
        _ => document
            .attribute(node, "value")
            .map(str::to_string)
            .unwrap_or_default(),
    }
}

fn option_value(document: &Document, option: NodeHandle) -> String {
    document
        .attribute(option, "value")
        .map(str::to_string)
        .unwrap_or_else(|| document.text_content(option))
}

fn mouse_button_code(button: MouseEventButton) -> i32 {
    match button {
        MouseEventButton::Main => 0,
        MouseEventButton::Auxiliary => 1,
        MouseEventButton::Secondary => 2,
        MouseEventButton::Fourth => 3,
        MouseEventButton::Fifth => 4,
    }
}

fn location_code(location: Location) -> i32 {
    match location {
        Location::Standard => 0,
        Location::Left => 1,
        Location::Right => 2,
        Location::Numpad => 3,
    }
}

fn delta_mode_code(mode: DeltaMode) -> i32 {
    match mode {
        DeltaMode::Pixel => 0,
        DeltaMode::Line => 1,
        DeltaMode::Page => 2,
    }
}

fn legacy_key_code(key: &Key) -> u32 {
    match key {
        Key::Character(text) => match text.chars().next() {
            Some(ch) if ch.is_ascii_alphanumeric() => ch.to_ascii_uppercase() as u32,
            Some(' ') => 32,
            _ => 0,
        },
        Key::Backspace => 8,
        Key::Tab => 9,
        Key::Enter => 13,
        Key::Shift => 16,
        Key::Control => 17,
        Key::Alt => 18,
        Key::Escape => 27,
        Key::PageUp => 33,
        Key::PageDown => 34,
        Key::End => 35,
        Key::Home => 36,
        Key::ArrowLeft => 37,
        Key::ArrowUp => 38,
        Key::ArrowRight => 39,
        Key::ArrowDown => 40,
        Key::Delete => 46,
        _ => 0,
    }
}

fn legacy_char_code(key: &Key) -> u32 {
    match key {
        Key::Character(text) => text.chars().next().map(|ch| ch as u32).unwrap_or(0),
        Key::Enter => 13,
        _ => 0,
    }
}
