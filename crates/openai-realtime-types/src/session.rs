use crate::audio::{AudioFormat, TurnDetection, Voice};
use crate::tools::{Tool, ToolChoice};

/// The session configuration sent in a `session.update` immediately after the
/// transport opens, and echoed back by the provider in `session.created`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// The set of modalities the model can respond with. To disable audio,
    /// set this to ["text"].
    modalities: Vec<String>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// The voice the model uses to respond. Cannot be changed once the model
    /// has responded with audio at least once.
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,

    /// The format of input audio. Options are "pcm16", "g711_ulaw", "g711_alaw".
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_format: Option<AudioFormat>,

    /// The format of output audio. Options are "pcm16", "g711_ulaw", "g711_alaw".
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_format: Option<AudioFormat>,

    /// Configuration for turn detection. Can be set to null to turn off.
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<TurnDetection>,

    /// Tools (functions) available to the model.
    tools: Vec<Tool>,

    /// How the model chooses tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,

    /// Sampling temperature for the model.
    temperature: f32,
}

impl Session {
    pub fn new() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }
}

pub struct SessionConfigurator {
    session: Session,
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: Session {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: None,
                voice: None,
                input_audio_format: None,
                output_audio_format: None,
                turn_detection: None,
                tools: vec![],
                tool_choice: Some(ToolChoice::Auto),
                temperature: 0.8,
            },
        }
    }

    pub fn with_modalities_disable_audio(mut self) -> Self {
        self.session.modalities = vec!["text".to_string()];
        self
    }

    pub fn with_modalities_enable_audio(mut self) -> Self {
        self.session.modalities = vec!["text".to_string(), "audio".to_string()];
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.session.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.session.voice = Some(voice);
        self
    }

    pub fn with_input_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.input_audio_format = Some(format);
        self
    }

    pub fn with_output_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.output_audio_format = Some(format);
        self
    }

    pub fn with_turn_detection_enable(mut self, turn_detection: TurnDetection) -> Self {
        self.session.turn_detection = Some(turn_detection);
        self
    }

    pub fn with_turn_detection_disable(mut self) -> Self {
        self.session.turn_detection = None;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.session.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.session.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.session.temperature = temperature;
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::{AudioFormat, Voice};
    use crate::tools::FunctionTool;

    #[test]
    fn test_session_wire_shape() {
        let session = Session::new()
            .with_modalities_enable_audio()
            .with_instructions("You are a call agent.")
            .with_voice(Voice::Alloy)
            .with_input_audio_format(AudioFormat::Mulaw)
            .with_output_audio_format(AudioFormat::Mulaw)
            .with_turn_detection_enable(Default::default())
            .with_tools(vec![Tool::Function(FunctionTool::new(
                "create_support_ticket",
                "Opens a support ticket",
                serde_json::json!({"type": "object"}),
            ))])
            .build();

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["modalities"], serde_json::json!(["text", "audio"]));
        assert_eq!(json["voice"], "alloy");
        assert_eq!(json["input_audio_format"], "g711_ulaw");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["tools"][0]["name"], "create_support_ticket");
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let session = Session::new().build();
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("instructions").is_none());
        assert!(json.get("voice").is_none());
        assert!(json.get("turn_detection").is_none());
    }
}
