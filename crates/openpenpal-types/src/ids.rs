//! Newtype identifiers. Keeps us from mixing up a `TaskId` with a `CourierId`
//! at a call site even though both are `Uuid` underneath.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(UserId);
id_type!(CourierId);
id_type!(LetterId);
id_type!(TaskId);
id_type!(AssignmentHistoryId);
id_type!(ScanRecordId);
id_type!(ScheduledTaskId);
id_type!(TaskExecutionId);
id_type!(BarcodeBatchId);
