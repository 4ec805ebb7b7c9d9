use kernel::id::{Id, markers};

/// Identity primary key (UUID v4)
pub type UserId = Id<markers::User>;
