use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct OutputMessage {
    pub message: &'static str,
}
