mod fetch;

pub use fetch::{FetchBody, FetchBridge, FetchError, FetchRequest, FetchResponse};
