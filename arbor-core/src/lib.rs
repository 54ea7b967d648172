// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data types shared by the authorization and licensing propagation engine.
//!
//! Resources form a strict ownership tree: an account owns root spaces, which own nested
//! subspaces. Every node owns exactly one [`AuthorizationPolicy`] and one [`License`] overlay,
//! both recomputed from the top of the tree downwards whenever policy-relevant state changes.
//!
//! This crate only holds the values and the collaborator interfaces ([`traits`]); the
//! algorithms live in `arbor-auth` and persistence in `arbor-store`.
pub mod cbor;
pub mod credential;
pub mod id;
pub mod license;
pub mod licensing;
pub mod node;
pub mod policy;
pub mod settings;
pub mod traits;

pub use credential::{Credential, CredentialCriterion, CredentialType};
pub use id::{ActorId, IdError, LicenseId, NodeId, PolicyId};
pub use license::{
    BaselineLicensePlan, Entitlement, EntitlementDataType, EntitlementType, GrantedEntitlement,
    License, LicenseType, Visibility,
};
pub use licensing::{LicensingCredentialRule, LicensingFramework};
pub use node::{AccountDetails, AccountType, NodeKind, ResourceNode, SpaceDetails};
pub use policy::{AuthorizationPolicy, CredentialRule, Privilege, PrivilegeRule};
pub use settings::{
    CollaborationSettings, CommunityPolicyView, MembershipPolicy, MembershipSettings,
    PrivacyMode, PrivacySettings, SpaceSettings,
};
