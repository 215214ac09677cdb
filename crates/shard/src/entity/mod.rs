//! Sea-ORM entities for the central store and the branch partitions
//!
//! Central store: catalog (`courses`, `chapters`, `lessons`, `tasks`), the
//! instructor bridge and the replication checkpoint.
//! Branch partitions: accounts, enrollments, comments, answers and read-only
//! replicas of the catalog tables.

pub mod answers;
pub mod branches;
pub mod chapters;
pub mod comments;
pub mod courses;
pub mod instructors;
pub mod learning;
pub mod lessons;
pub mod replication_checkpoints;
pub mod tasks;
pub mod users;

// Re-export entities for convenience
pub use answers::Entity as Answers;
pub use branches::Entity as Branches;
pub use chapters::Entity as Chapters;
pub use comments::Entity as Comments;
pub use courses::Entity as Courses;
pub use instructors::Entity as Instructors;
pub use learning::Entity as Learning;
pub use lessons::Entity as Lessons;
pub use replication_checkpoints::Entity as ReplicationCheckpoints;
pub use tasks::Entity as Tasks;
pub use users::Entity as Users;
