/// Conversation items this client creates. Tool results are the only item
/// kind sent upstream: a completed function call is answered by a
/// `function_call_output` item, never by a bare response request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput(FunctionCallOutputItem),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallOutputItem {
    /// Correlates the output with the function call that requested it.
    call_id: String,

    /// The serialized result payload returned to the model.
    output: String,
}

impl FunctionCallOutputItem {
    pub fn new(call_id: &str, output: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            output: output.to_string(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

/// An item as reported back by the provider in `conversation.item.created`.
/// Only the fields this system inspects are modeled; the rest are ignored.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ItemResource {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_function_call_output_wire_shape() {
        let item = Item::FunctionCallOutput(FunctionCallOutputItem::new(
            "call_123",
            r#"{"success":true}"#,
        ));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "function_call_output");
        assert_eq!(json["call_id"], "call_123");
        assert_eq!(json["output"], r#"{"success":true}"#);
    }

    #[test]
    fn test_item_resource_ignores_unknown_fields() {
        let json = r#"{"id":"item_1","type":"message","status":"completed","role":"assistant","content":[]}"#;
        let item: ItemResource = serde_json::from_str(json).unwrap();
        assert_eq!(item.id.as_deref(), Some("item_1"));
        assert_eq!(item.kind.as_deref(), Some("message"));
    }
}
