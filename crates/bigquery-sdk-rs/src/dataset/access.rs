use std::fmt;
use std::str::FromStr;

use bigquery_model_rs::dataset::AccessEntry;
use bigquery_model_rs::{DatasetReference, TableReference};

use crate::Error;
use crate::resource::SubResource;
use crate::table::IntoTableRef;

/// The role granted by an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "READER",
            Self::Writer => "WRITER",
            Self::Owner => "OWNER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "owner" => Ok(Self::Owner),
            _ => Err(Error::invalid_argument(format!("unknown access role '{s}'"))),
        }
    }
}

/// Who a role-based access rule grants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    User,
    Group,
    Domain,
    SpecialGroup,
    IamMember,
}

impl Scope {
    /// The wire field holding the grantee.
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::User => "userByEmail",
            Self::Group => "groupByEmail",
            Self::Domain => "domain",
            Self::SpecialGroup => "specialGroup",
            Self::IamMember => "iamMember",
        }
    }

    fn value_of(self, entry: &AccessEntry) -> Option<&str> {
        let value = match self {
            Self::User => &entry.user_by_email,
            Self::Group => &entry.group_by_email,
            Self::Domain => &entry.domain,
            Self::SpecialGroup => &entry.special_group,
            Self::IamMember => &entry.iam_member,
        };

        value.as_deref()
    }

    fn normalize(self, value: &str) -> &str {
        match self {
            Self::SpecialGroup => special_group(value),
            _ => value,
        }
    }

    fn rule(self, role: Role, value: &str) -> AccessEntry {
        let mut entry = AccessEntry {
            role: Some(role.as_str().into()),
            ..Default::default()
        };

        let value = Some(Box::from(value));
        match self {
            Self::User => entry.user_by_email = value,
            Self::Group => entry.group_by_email = value,
            Self::Domain => entry.domain = value,
            Self::SpecialGroup => entry.special_group = value,
            Self::IamMember => entry.iam_member = value,
        }

        entry
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "user_by_email" | "userbyemail" => Ok(Self::User),
            "group" | "group_by_email" | "groupbyemail" => Ok(Self::Group),
            "domain" => Ok(Self::Domain),
            "special" | "special_group" | "specialgroup" => Ok(Self::SpecialGroup),
            "iam_member" | "iammember" => Ok(Self::IamMember),
            _ => Err(Error::invalid_argument(format!("unknown access scope '{s}'"))),
        }
    }
}

/// Expands the short names accepted for special groups. Unknown names pass
/// through unchanged.
pub fn special_group(name: &str) -> &str {
    match name {
        "owners" | "project_owners" | "projectOwners" => "projectOwners",
        "readers" | "project_readers" | "projectReaders" => "projectReaders",
        "writers" | "project_writers" | "projectWriters" => "projectWriters",
        "all" | "all_authenticated_users" | "allAuthenticatedUsers" => "allAuthenticatedUsers",
        other => other,
    }
}

macro_rules! impl_rule_fns {
    ($($role:ident, $scope:ident => $add:ident, $remove:ident, $has:ident;)*) => {
        $(
            pub fn $add(&mut self, value: &str) {
                self.add(Role::$role, Scope::$scope, value);
            }

            pub fn $remove(&mut self, value: &str) -> bool {
                self.remove(Role::$role, Scope::$scope, value)
            }

            pub fn $has(&self, value: &str) -> bool {
                self.contains(Role::$role, Scope::$scope, value)
            }
        )*
    };
}

/// A dataset's access control list, edited inside
/// [`Dataset::update_access`](super::Dataset::update_access).
///
/// Granting a role to a grantee replaces whatever role it held before.
/// Authorized views carry no role.
#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    dataset: DatasetReference,
    rules: Vec<AccessEntry>,
    changed: bool,
}

impl Access {
    pub(crate) fn new(dataset: DatasetReference, rules: Vec<AccessEntry>) -> Self {
        Self {
            dataset,
            rules,
            changed: false,
        }
    }

    pub fn rules(&self) -> &[AccessEntry] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn into_rules(self) -> Vec<AccessEntry> {
        self.rules
    }

    pub fn add(&mut self, role: Role, scope: Scope, value: &str) {
        let value = scope.normalize(value);
        let rule = scope.rule(role, value);

        let current = self
            .rules
            .iter()
            .filter(|entry| scope.value_of(entry) == Some(value));

        if current.eq([&rule]) {
            return;
        }

        self.rules
            .retain(|entry| scope.value_of(entry) != Some(value));
        self.rules.push(rule);
        self.changed = true;
    }

    pub fn remove(&mut self, role: Role, scope: Scope, value: &str) -> bool {
        let value = scope.normalize(value);
        let before = self.rules.len();

        self.rules
            .retain(|entry| !matches_rule(entry, role, scope, value));

        let removed = self.rules.len() != before;
        self.changed |= removed;
        removed
    }

    pub fn contains(&self, role: Role, scope: Scope, value: &str) -> bool {
        let value = scope.normalize(value);
        self.rules
            .iter()
            .any(|entry| matches_rule(entry, role, scope, value))
    }

    /// Like [`add`](Self::add), with the role and scope given by name, i.e
    /// `add_rule("reader", "special", "all")`.
    pub fn add_rule(&mut self, role: &str, scope: &str, value: &str) -> crate::Result<()> {
        let role = role.parse()?;
        let scope = scope.parse()?;
        self.add(role, scope, value);
        Ok(())
    }

    pub fn remove_rule(&mut self, role: &str, scope: &str, value: &str) -> crate::Result<bool> {
        let role = role.parse()?;
        let scope = scope.parse()?;
        Ok(self.remove(role, scope, value))
    }

    impl_rule_fns! {
        Reader, User => add_reader_user, remove_reader_user, has_reader_user;
        Reader, Group => add_reader_group, remove_reader_group, has_reader_group;
        Reader, Domain => add_reader_domain, remove_reader_domain, has_reader_domain;
        Reader, SpecialGroup => add_reader_special, remove_reader_special, has_reader_special;
        Reader, IamMember => add_reader_iam_member, remove_reader_iam_member, has_reader_iam_member;
        Writer, User => add_writer_user, remove_writer_user, has_writer_user;
        Writer, Group => add_writer_group, remove_writer_group, has_writer_group;
        Writer, Domain => add_writer_domain, remove_writer_domain, has_writer_domain;
        Writer, SpecialGroup => add_writer_special, remove_writer_special, has_writer_special;
        Writer, IamMember => add_writer_iam_member, remove_writer_iam_member, has_writer_iam_member;
        Owner, User => add_owner_user, remove_owner_user, has_owner_user;
        Owner, Group => add_owner_group, remove_owner_group, has_owner_group;
        Owner, Domain => add_owner_domain, remove_owner_domain, has_owner_domain;
        Owner, SpecialGroup => add_owner_special, remove_owner_special, has_owner_special;
        Owner, IamMember => add_owner_iam_member, remove_owner_iam_member, has_owner_iam_member;
    }

    /// Authorizes a view to read this dataset. Unqualified names resolve
    /// against the dataset itself.
    pub fn add_reader_view(&mut self, view: impl IntoTableRef) -> crate::Result<()> {
        let view = view.into_table_ref(&self.dataset)?;
        if self.find_view(&view).is_none() {
            self.rules.push(AccessEntry {
                view: Some(view),
                ..Default::default()
            });
            self.changed = true;
        }

        Ok(())
    }

    pub fn remove_reader_view(&mut self, view: impl IntoTableRef) -> crate::Result<bool> {
        let view = view.into_table_ref(&self.dataset)?;
        let Some(index) = self.find_view(&view) else {
            return Ok(false);
        };

        self.rules.remove(index);
        self.changed = true;
        Ok(true)
    }

    pub fn has_reader_view(&self, view: impl IntoTableRef) -> crate::Result<bool> {
        let view = view.into_table_ref(&self.dataset)?;
        Ok(self.find_view(&view).is_some())
    }

    fn find_view(&self, view: &TableReference) -> Option<usize> {
        self.rules
            .iter()
            .position(|entry| entry.view.as_ref() == Some(view))
    }
}

fn matches_rule(entry: &AccessEntry, role: Role, scope: Scope, value: &str) -> bool {
    entry.role.as_deref() == Some(role.as_str()) && scope.value_of(entry) == Some(value)
}

impl SubResource for Access {
    fn changed(&self) -> bool {
        self.changed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn access() -> Access {
        let rules = serde_json::from_value(json!([
            { "role": "OWNER", "specialGroup": "projectOwners" },
            { "role": "READER", "userByEmail": "a@example.com" }
        ]))
        .unwrap();

        Access::new(DatasetReference::new("p", "d"), rules)
    }

    #[test]
    fn test_granting_replaces_previous_role() {
        let mut access = access();
        assert!(access.has_reader_user("a@example.com"));

        access.add_writer_user("a@example.com");
        assert!(access.changed());
        assert!(!access.has_reader_user("a@example.com"));
        assert!(access.has_writer_user("a@example.com"));
        assert_eq!(access.len(), 2);
    }

    #[test]
    fn test_noop_edits_leave_access_unchanged() {
        let mut access = access();
        access.add_reader_user("a@example.com");
        access.add_owner_special("owners");
        assert!(!access.remove_writer_group("nobody@example.com"));
        assert!(!access.changed());
    }

    #[test]
    fn test_special_group_aliases() {
        let mut access = access();
        assert!(access.has_owner_special("owners"));
        assert!(access.has_owner_special("project_owners"));

        access.add_reader_special("all");
        assert_eq!(
            access.rules().last().and_then(|rule| rule.special_group.as_deref()),
            Some("allAuthenticatedUsers")
        );

        assert!(access.remove_reader_special("all_authenticated_users"));
        assert!(!access.has_reader_special("all"));
    }

    #[test]
    fn test_rules_by_name_are_validated() -> crate::Result<()> {
        let mut access = access();
        access.add_rule("reader", "group_by_email", "team@example.com")?;
        assert!(access.has_reader_group("team@example.com"));

        assert!(matches!(
            access.add_rule("admin", "user", "x@example.com"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            access.add_rule("reader", "everyone", "x"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(access.remove_rule("READER", "groupByEmail", "team@example.com")?);
        Ok(())
    }

    #[test]
    fn test_authorized_views() -> crate::Result<()> {
        let mut access = access();
        access.add_reader_view("other.events_view")?;
        access.add_reader_view(TableReference::new("p", "other", "events_view"))?;
        assert_eq!(access.len(), 3);

        let rule = access.rules().last().unwrap();
        assert!(rule.role.is_none());
        assert!(access.has_reader_view("p:other.events_view")?);

        assert!(access.remove_reader_view("p.other.events_view")?);
        assert!(!access.has_reader_view("other.events_view")?);
        assert!(access.add_reader_view("bad..name").is_err());
        Ok(())
    }
}
