//! JSON frame shapes for the browser-session WebSocket, one frame per
//! message, tagged on `type`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Answer { sdp: String },
    Ice { candidate: serde_json::Value },
    Back,
    Forward,
    MouseMove { x: f64, y: f64 },
    MouseDown { x: f64, y: f64, button: u8 },
    MouseUp { x: f64, y: f64, button: u8 },
    Scroll { x: f64, y: f64, dx: f64, dy: f64 },
    KeyDown { key: String, code: String, modifiers: u8 },
    KeyUp { key: String, code: String, modifiers: u8 },
}

/// `1→middle, 2→right, else→left`.
pub fn cdp_button_name(button: u8) -> &'static str {
    match button {
        1 => "middle",
        2 => "right",
        _ => "left",
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    IceServers { list: Vec<IceServerJson> },
    Offer { sdp: String },
    Ready { width: u32, height: u32 },
    Ice { candidate: serde_json::Value },
    Url { current: String, can_back: bool, can_forward: bool },
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct IceServerJson {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_mapping_is_middle_right_else_left() {
        assert_eq!(cdp_button_name(1), "middle");
        assert_eq!(cdp_button_name(2), "right");
        assert_eq!(cdp_button_name(0), "left");
        assert_eq!(cdp_button_name(9), "left");
    }

    #[test]
    fn inbound_mouse_move_deserializes() {
        let json = r#"{"type":"mouseMove","x":1.5,"y":2.5}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, InboundMessage::MouseMove { x, y } if x == 1.5 && y == 2.5));
    }
}
