use redb::TableDefinition;

/// Post records: id -> Post (msgpack)
pub const POSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("posts");

/// Job entities: entity id -> JobEntity (msgpack)
pub const JOBS: TableDefinition<i64, &[u8]> = TableDefinition::new("jobs");

/// Job number index: job_num -> entity id. Keeps job numbers unique.
pub const JOB_NUMBERS: TableDefinition<i64, i64> = TableDefinition::new("job_numbers");

/// Id counters: table name -> last allocated id
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
