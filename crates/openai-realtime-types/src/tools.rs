#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Tool {
    #[serde(rename = "function")]
    Function(FunctionTool),
}

impl Tool {
    pub fn name(&self) -> &str {
        match self {
            Tool::Function(f) => f.name(),
        }
    }
}

/// A function the model may call mid-conversation. `parameters` is the
/// JSON Schema the provider uses to shape the generated arguments.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl FunctionTool {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tool_choice_wire_strings() {
        assert_eq!(serde_json::to_string(&ToolChoice::Auto).unwrap(), r#""auto""#);
        assert_eq!(serde_json::to_string(&ToolChoice::Required).unwrap(), r#""required""#);
    }

    #[test]
    fn test_function_tool_tagging() {
        let tool = Tool::Function(FunctionTool::new(
            "schedule_appointment",
            "Books an appointment",
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "schedule_appointment");
    }
}
