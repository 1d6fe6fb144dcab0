//! Mock tests for identity token minting
//!
//! These tests simulate the metadata server with WireMock.

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::IdentityConfig;
    use crate::error::AuthError;
    use crate::identity::IdentityTokenSource;

    const AUDIENCE: &str = "https://summarizer.example.run.app";

    fn source(server: &MockServer) -> IdentityTokenSource {
        IdentityTokenSource::new(IdentityConfig {
            metadata_endpoint: format!("{}/identity", server.uri()),
            ..IdentityConfig::default()
        })
        .expect("valid identity config")
    }

    #[tokio::test]
    async fn test_mint_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .and(query_param("audience", AUDIENCE))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("eyJhbGciOi.token.sig\n"))
            .expect(1)
            .mount(&server)
            .await;

        let token = source(&server).mint(AUDIENCE).await.unwrap();
        assert_eq!(token.as_str(), "eyJhbGciOi.token.sig");
    }

    #[tokio::test]
    async fn test_refused_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = source(&server).mint(AUDIENCE).await.unwrap_err();
        match err {
            AuthError::Credential { audience, reason } => {
                assert_eq!(audience, AUDIENCE);
                assert!(reason.contains("403"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/identity"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .mount(&server)
            .await;

        let err = source(&server).mint(AUDIENCE).await.unwrap_err();
        assert!(matches!(err, AuthError::Credential { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_metadata_server() {
        let source = IdentityTokenSource::new(IdentityConfig {
            metadata_endpoint: "http://127.0.0.1:1/identity".to_string(),
            ..IdentityConfig::default()
        })
        .unwrap();

        let err = source.mint(AUDIENCE).await.unwrap_err();
        assert!(matches!(err, AuthError::Credential { .. }));
    }
}
