use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("carrier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("carrier API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// A call resource as returned by the carrier REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    pub status: String,
}

/// Thin client for the carrier's REST API plus call-control markup
/// generation. Placing and completing calls goes through REST; everything
/// mid-call happens on the media stream.
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    phone_number: String,
}

impl TwilioClient {
    pub fn new(account_sid: &str, auth_token: &str, phone_number: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            phone_number: phone_number.to_string(),
        }
    }

    /// Places an outbound call that will fetch its instructions from
    /// `webhook_url` once answered. Answering-machine detection is on so a
    /// voicemail pickup does not burn a full agent session.
    pub async fn make_outbound_call(
        &self,
        to_number: &str,
        webhook_url: &str,
    ) -> Result<CallResource, TwilioError> {
        let url = format!("{TWILIO_API_BASE}/Accounts/{}/Calls.json", self.account_sid);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to_number),
                ("From", self.phone_number.as_str()),
                ("Url", webhook_url),
                ("Record", "true"),
                ("MachineDetection", "DetectMessageEnd"),
                ("MachineDetectionTimeout", "3000"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TwilioError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let call: CallResource = response.json().await?;
        tracing::info!("outbound call initiated: {}", call.sid);
        Ok(call)
    }

    /// Fetches the current state of a call.
    pub async fn get_call(&self, call_sid: &str) -> Result<CallResource, TwilioError> {
        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Calls/{call_sid}.json",
            self.account_sid
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TwilioError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Hangs up a live call by moving it to "completed".
    pub async fn complete_call(&self, call_sid: &str) -> Result<CallResource, TwilioError> {
        let url = format!(
            "{TWILIO_API_BASE}/Accounts/{}/Calls/{call_sid}.json",
            self.account_sid
        );
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TwilioError::Api {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!("call ended: {}", call_sid);
        Ok(response.json().await?)
    }
}

/// Builds the voice response for an answered call: an optional spoken
/// greeting, then a bidirectional media stream back to this service.
pub fn voice_response(greeting: Option<&str>, stream_url: &str) -> String {
    let say = greeting
        .map(|text| format!("  <Say voice=\"alice\">{}</Say>\n", escape_xml(text)))
        .unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n\
         {say}  <Connect>\n\
         \x20   <Stream url=\"{}\" />\n\
         \x20 </Connect>\n\
         </Response>",
        escape_xml(stream_url)
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_response_contains_greeting_and_stream() {
        let twiml = voice_response(
            Some("Welcome, connecting you now."),
            "wss://example.org/media-stream",
        );
        assert!(twiml.starts_with("<?xml"));
        assert!(twiml.contains("<Say voice=\"alice\">Welcome, connecting you now.</Say>"));
        assert!(twiml.contains("<Stream url=\"wss://example.org/media-stream\" />"));
        assert!(twiml.contains("<Connect>"));
    }

    #[test]
    fn voice_response_without_greeting_skips_say() {
        let twiml = voice_response(None, "wss://example.org/media-stream");
        assert!(!twiml.contains("<Say"));
        assert!(twiml.contains("<Stream"));
    }

    #[test]
    fn greeting_is_escaped() {
        let twiml = voice_response(Some("Fish & Chips <Ltd>"), "wss://example.org/ms");
        assert!(twiml.contains("Fish &amp; Chips &lt;Ltd&gt;"));
    }
}
