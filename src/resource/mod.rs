//! Resource providers
//!
//! Each provider is a value describing desired state. Running it builds an
//! action table over that value and hands it to the converge engine, which
//! applies guards, logging, error policy and notifications.
//!
//! | Type | Actions |
//! |------|---------|
//! | [`Directory`] | create, remove |
//! | [`Template`] | create |
//! | [`CopyFile`] | run |
//! | [`MoveFile`] | run |
//! | [`Download`] | run |
//! | [`User`] | create, remove |
//! | [`Group`] | create, remove |
//! | [`Command`] | run |
//! | [`Package`] | install |

pub mod accounts;
pub mod command;
pub mod directory;
pub mod file;
pub mod group;
pub mod package;
pub mod perms;
pub mod template;
pub mod user;

pub use accounts::AccountManager;
pub use command::Command;
pub use directory::Directory;
pub use file::{CopyFile, Download, MoveFile};
pub use group::Group;
pub use package::{Package, PackageManager};
pub use template::Template;
pub use user::User;
