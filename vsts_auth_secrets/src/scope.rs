use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitOr;

const BUILD_ACCESS: &str = "vso.build";
const BUILD_EXECUTE: &str = "vso.build_execute";
const CHAT_MANAGE: &str = "vso.chat_manage";
const CODE_READ: &str = "vso.code";
const CODE_MANAGE: &str = "vso.code_manage";
const CODE_WRITE: &str = "vso.code_write";
const PACKAGING_READ: &str = "vso.packaging";
const PACKAGING_MANAGE: &str = "vso.packaging_manage";
const PACKAGING_WRITE: &str = "vso.packaging_write";
const PROFILE_READ: &str = "vso.profile";
const SERVICE_ENDPOINT_MANAGE: &str = "vso.serviceendpoint_manage";
const SERVICE_ENDPOINT_QUERY: &str = "vso.serviceendpoint_query";
const TEST_READ: &str = "vso.test";
const TEST_WRITE: &str = "vso.test_write";
const WORK_READ: &str = "vso.work";
const WORK_WRITE: &str = "vso.work_write";

const ALL: &[&str] = &[
    BUILD_ACCESS,
    BUILD_EXECUTE,
    CHAT_MANAGE,
    CODE_READ,
    CODE_MANAGE,
    CODE_WRITE,
    PACKAGING_READ,
    PACKAGING_MANAGE,
    PACKAGING_WRITE,
    PROFILE_READ,
    SERVICE_ENDPOINT_MANAGE,
    SERVICE_ENDPOINT_QUERY,
    TEST_READ,
    TEST_WRITE,
    WORK_READ,
    WORK_WRITE,
];

/// A set of named scopes a personal access token is minted with
///
/// Scope sets combine with `|` and serialize as a canonical space-separated
/// list, which goes into the session-token request body verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VsoTokenScope {
    scopes: BTreeSet<&'static str>,
}

macro_rules! scope_constructors {
    ($($(#[$meta:meta])* $name:ident => $scope:ident;)*) => {
        $(
            $(#[$meta])*
            pub fn $name() -> Self {
                Self::single($scope)
            }
        )*
    };
}

impl VsoTokenScope {
    /// The empty scope set
    pub fn none() -> Self {
        Self::default()
    }

    /// The union of every named scope
    pub fn all_scopes() -> Self {
        Self {
            scopes: ALL.iter().copied().collect(),
        }
    }

    scope_constructors! {
        /// Read access to build artifacts and results
        build_access => BUILD_ACCESS;
        /// Queue builds and update build properties
        build_execute => BUILD_EXECUTE;
        /// Manage chat rooms and messages
        chat_manage => CHAT_MANAGE;
        /// Read source code and version control metadata
        code_read => CODE_READ;
        /// Manage version control repositories
        code_manage => CODE_MANAGE;
        /// Read and push source code
        code_write => CODE_WRITE;
        /// Read packaging feeds and packages
        packaging_read => PACKAGING_READ;
        /// Create and administer packaging feeds
        packaging_manage => PACKAGING_MANAGE;
        /// Push and unlist packages
        packaging_write => PACKAGING_WRITE;
        /// Read the user profile
        profile_read => PROFILE_READ;
        /// Manage service endpoints
        service_endpoint_manage => SERVICE_ENDPOINT_MANAGE;
        /// Query service endpoints
        service_endpoint_query => SERVICE_ENDPOINT_QUERY;
        /// Read test plans and results
        test_read => TEST_READ;
        /// Publish test results
        test_write => TEST_WRITE;
        /// Read work items and queries
        work_read => WORK_READ;
        /// Create and update work items
        work_write => WORK_WRITE;
    }

    fn single(scope: &'static str) -> Self {
        let mut scopes = BTreeSet::new();
        scopes.insert(scope);
        Self { scopes }
    }

    /// True when no scopes are present
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// True when every scope in `other` is present in this set
    pub fn contains(&self, other: &Self) -> bool {
        other.scopes.is_subset(&self.scopes)
    }

    /// The canonical space-separated serialization
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for scope in &self.scopes {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(scope);
        }
        out
    }
}

impl BitOr for VsoTokenScope {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self {
        self.scopes.extend(rhs.scopes);
        self
    }
}

impl fmt::Display for VsoTokenScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
