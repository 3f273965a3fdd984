use std::collections::BTreeMap;
use uuid::Uuid;

pub type JobId = Uuid;
pub type Script = bytes::Bytes;
/// Allow-listed header directives, exported to the job as environment variables.
pub type JobOptions = BTreeMap<String, String>;
