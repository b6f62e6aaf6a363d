mod local_record;

pub use local_record::{parse_field, LocalRecord};
