//! Local description of an organization's teams, members and repository
//! permissions, with the rules keeping it canonical.

mod document;
mod lookup;
mod merge;
mod model;
mod normalize;
mod storage;

pub use lookup::{LookupError, find_team, find_user, find_users};
pub use merge::merge;
pub use model::{
    CodeReviewAssignment, Config, ExcludedMember, Grantee, OutsideCollaborator, RepoPermission,
    Repository, ReviewAlgorithm, Team, TeamPrivacy, User,
};
pub use normalize::{NormalizeOptions, ValidationError, normalize, sanity_check, sort_config};
pub use storage::{
    Format, OverrideConfig, TeamOverride, is_not_found, load_state, parse, render, store_state,
};
