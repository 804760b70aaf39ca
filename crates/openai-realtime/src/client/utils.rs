use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::{AUTHORIZATION_HEADER, OPENAI_BETA_HEADER};

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = format!(
        "{}/realtime?model={}",
        config.base_url(),
        config.model()
    )
    .into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION_HEADER,
        format!("Bearer {}", config.api_key().expose_secret())
            .as_str()
            .parse()?,
    );
    request
        .headers_mut()
        .insert(OPENAI_BETA_HEADER, "realtime=v1".parse()?);
    Ok(request)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_request_headers() {
        let config = Config::builder()
            .with_base_url("ws://127.0.0.1:9000")
            .with_api_key("sk-test")
            .with_model("gpt-4o-realtime-preview")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(
            request.uri().to_string(),
            "ws://127.0.0.1:9000/realtime?model=gpt-4o-realtime-preview"
        );
        assert_eq!(
            request.headers().get(AUTHORIZATION_HEADER).unwrap(),
            "Bearer sk-test"
        );
        assert_eq!(
            request.headers().get(OPENAI_BETA_HEADER).unwrap(),
            "realtime=v1"
        );
    }
}
