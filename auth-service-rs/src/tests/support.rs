//! Token signing helpers shared by the auth tests

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::ValidatorConfig;
use crate::validator::TokenValidator;

pub const TEST_KEY_PEM: &[u8] = include_bytes!("fixtures/test_rsa_key.pem");
pub const OTHER_KEY_PEM: &[u8] = include_bytes!("fixtures/other_rsa_key.pem");

/// Base64url modulus of `TEST_KEY_PEM`
pub const TEST_KEY_N: &str = "n8eqmkNj7VERaJTovtcVC6Lcxwyx1_yTN1duJYV8m8bg612FankMf1G8GuqgLq4UlTwfbZjqD8idKEh7oIsexI4U-9s1Gv1uQR2EVWCiWSpwlJf2ybP7dn0_ywFlrp_T4Cf5UMxgso9j94ZQDcywjEZBNaGPJdRLNGKT7fwamI4KuPTazSTgBGF1h_FR0pSZDxplhCVL8Z9SyKvC11dkN6vX9WLhn6WYdebQYZlKsEJYo8jol94cGZwoqxN7g4qKFeNSq_l_OrznWRN2hcNqMSMCtAlgKJHz5Zgv7ybAGaCHb5MgVo2G2BixGcJJkwGrrsvz1QpvZEag-uoWBcxHzQ";

pub const TEST_KID: &str = "test-key-1";
pub const AUDIENCE: &str = "https://summarizer.example.run.app";
pub const ISSUER: &str = "https://accounts.google.com";

/// Standard claims for a token valid for the next hour
pub fn valid_claims() -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "sub": "112233445566",
        "email": "orchestrator@project.iam.gserviceaccount.com",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

/// Sign `claims` with RS256 using `key_pem`
pub fn sign(claims: &Value, kid: Option<&str>, key_pem: &[u8]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(key_pem).expect("fixture key must parse");
    encode(&header, claims, &key).expect("signing must succeed")
}

pub fn jwks(kid: &str) -> Value {
    json!({
        "keys": [
            {
                "kty": "RSA",
                "kid": kid,
                "use": "sig",
                "alg": "RS256",
                "n": TEST_KEY_N,
                "e": "AQAB"
            }
        ]
    })
}

/// Serve the test key set at `/certs`
pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(TEST_KID)))
        .mount(server)
        .await;
}

pub fn validator_config(server: &MockServer) -> ValidatorConfig {
    ValidatorConfig {
        cert_endpoint: format!("{}/certs", server.uri()),
        ..ValidatorConfig::new(AUDIENCE)
    }
}

pub fn validator(server: &MockServer) -> TokenValidator {
    TokenValidator::new(validator_config(server)).expect("valid validator config")
}
