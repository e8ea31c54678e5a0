use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Search backend failure: {0}")]
    SearchFailure(String),

    #[error("Illegal operation: {0}")]
    IllegalOperation(String),

    #[error("Component not started: {0}")]
    ComponentUnavailable(String),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Failed publishing message: {0}")]
    PublishFailure(String),

    #[error("Invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid pagination token")]
    InvalidCursor,

    #[error("Not found")]
    NotFound,
}

impl Error {
    /// Stable numeric code, part of the wire contract
    pub fn code(&self) -> u32 {
        match self {
            Error::Unknown(_) => 10000,
            Error::StorageFailure(_) => 10007,
            Error::SearchFailure(_) => 10008,
            Error::IllegalOperation(_) => 10009,
            Error::ComponentUnavailable(_) => 10010,
            Error::TransactionAborted(_) => 10011,
            Error::PublishFailure(_) => 10012,
            Error::InvalidIdentifier(_) => 10101,
            Error::InvalidCursor => 10102,
            Error::NotFound => 10105,
        }
    }

    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::SearchFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::IllegalOperation(_) => StatusCode::BAD_REQUEST,
            Error::ComponentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::TransactionAborted(_) => StatusCode::CONFLICT,
            Error::PublishFailure(_) => StatusCode::BAD_GATEWAY,
            Error::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCursor => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        let code = self.code();
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "code": code,
                "type": "unknown",
                "message": msg,
            }),
            Error::StorageFailure(msg) => json!({
                "code": code,
                "type": "storage-failure",
                "message": msg,
            }),
            Error::SearchFailure(msg) => json!({
                "code": code,
                "type": "search-failure",
                "message": msg,
            }),
            Error::IllegalOperation(msg) => json!({
                "code": code,
                "type": "illegal-operation",
                "message": msg,
            }),
            Error::ComponentUnavailable(component) => json!({
                "code": code,
                "type": "component-unavailable",
                "message": "component not started",
                "component": component,
            }),
            Error::TransactionAborted(msg) => json!({
                "code": code,
                "type": "transaction-aborted",
                "message": msg,
            }),
            Error::PublishFailure(msg) => json!({
                "code": code,
                "type": "publish-failure",
                "message": msg,
            }),
            Error::InvalidIdentifier(id) => json!({
                "code": code,
                "type": "invalid-identifier",
                "message": "invalid identifier",
                "id": id,
            }),
            Error::InvalidCursor => json!({
                "code": code,
                "type": "invalid-cursor",
                "message": "invalid or expired pagination token",
            }),
            Error::NotFound => json!({
                "code": code,
                "type": "not-found",
                "message": "no matching record",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| -> anyhow::Result<String> {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents has no string field {name:?}"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(field("message").unwrap_or_default()),
                "storage-failure" => Error::StorageFailure(field("message")?),
                "search-failure" => Error::SearchFailure(field("message")?),
                "illegal-operation" => Error::IllegalOperation(field("message")?),
                "component-unavailable" => Error::ComponentUnavailable(field("component")?),
                "transaction-aborted" => Error::TransactionAborted(field("message")?),
                "publish-failure" => Error::PublishFailure(field("message")?),
                "invalid-identifier" => Error::InvalidIdentifier(field("id")?),
                "invalid-cursor" => Error::InvalidCursor,
                "not-found" => Error::NotFound,
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_survive_the_wire() {
        let errs = [
            Error::Unknown(String::from("boom")),
            Error::StorageFailure(String::from("connection reset")),
            Error::SearchFailure(String::from("bad query")),
            Error::IllegalOperation(String::from("comment belongs to another subject")),
            Error::ComponentUnavailable(String::from("graph mirror")),
            Error::TransactionAborted(String::from("serialization failure")),
            Error::PublishFailure(String::from("channel closed")),
            Error::InvalidIdentifier(String::from("xyz")),
            Error::InvalidCursor,
            Error::NotFound,
        ];
        for e in errs {
            assert_eq!(Error::parse(&e.contents()).unwrap(), e);
        }
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidIdentifier(String::new()).code(), 10101);
        assert_eq!(Error::InvalidCursor.code(), 10102);
        assert_eq!(Error::NotFound.code(), 10105);
        assert_eq!(Error::StorageFailure(String::new()).code(), 10007);
        let body: serde_json::Value = serde_json::from_slice(&Error::NotFound.contents()).unwrap();
        assert_eq!(body["code"], 10105);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(Error::parse(b"{\"type\": \"nope\"}").is_err());
        assert!(Error::parse(b"not json").is_err());
    }
}
