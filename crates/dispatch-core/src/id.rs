// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-id generation.

crate::define_req_id!();

/// Mint a fresh opaque request id.
///
/// Backed by UUID v4. Callers must not attach meaning to it beyond
/// equality — it's just a token correlated with its `_ACK`.
pub fn fresh_req_id() -> ReqId {
    ReqId(uuid::Uuid::new_v4().to_string())
}

#[macro_export]
macro_rules! define_req_id {
    () => {
        /// Opaque identifier correlating a `REQUEST`/`CHECK` with its ack.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct ReqId(pub String);

        impl ReqId {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for ReqId {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for ReqId {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for ReqId {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}
