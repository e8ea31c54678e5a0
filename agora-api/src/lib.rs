use chrono::{SubsecRound, TimeZone, Utc};
use std::{fmt, str::FromStr};

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
mod counter;
mod cursor;
mod db;
mod error;
mod hierarchy;
mod label;
mod pin;
mod relation;
mod service;
mod subject;

pub use comment::*;
pub use counter::{apply_delta, Delta};
pub use cursor::*;
pub use db::*;
pub use error::Error;
pub use hierarchy::{classify, Level};
pub use label::*;
pub use pin::{plan_pin, PinPlan, PinState, ReleaseMode, PINNED_SORT_TIME};
pub use relation::*;
pub use service::{Service, ServiceConfig, BLOCK_REPLIES};
pub use subject::*;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            serde::Deserialize,
            serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> $name {
                $name(Uuid::new_v4())
            }

            pub fn stub() -> $name {
                $name(STUB_UUID)
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name::new()
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<$name, Error> {
                Uuid::try_parse(s)
                    .map($name)
                    .map_err(|_| Error::InvalidIdentifier(String::from(s)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(CommentId);
id_type!(SubjectId);
id_type!(UserId);
id_type!(LabelId);
id_type!(RelationId);
id_type!(ObjectId);

/// Milliseconds since the epoch, the unit every sort key is stored in
pub fn millis(t: &Time) -> i64 {
    t.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<Time> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Current time, truncated to the precision stores keep
pub fn now() -> Time {
    Utc::now().trunc_subsecs(3)
}
