/// Field names recorded on spans after creation.
/// Keep these stable; log pipelines match on them.
pub const KEY_ATTEMPT: &str = "poll.attempt";
pub const KEY_POD_STATUS: &str = "container.status";

pub const KEY_CHUNKS: &str = "stream.chunks";
pub const KEY_OUTCOME: &str = "outcome";

pub const KEY_ERROR_MESSAGE: &str = "error.message";
