//! Category enum and the per-category logical-to-store field tables.
//!
//! Every field the oracle may emit for a category is listed here, together
//! with the property name the destination collection uses for it. Keeping the
//! mapping as static tables indexed by [`Category`] keeps it exhaustive: a new
//! category cannot be added without the compiler pointing at every match below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of destinations a capture can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Person,
    Project,
    Idea,
    Admin,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Person,
        Category::Project,
        Category::Idea,
        Category::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Project => "project",
            Category::Idea => "idea",
            Category::Admin => "admin",
        }
    }

    /// Human-facing label used in confirmations and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Person => "Person",
            Category::Project => "Project",
            Category::Idea => "Idea",
            Category::Admin => "Admin",
        }
    }

    /// Logical field names the oracle may emit for this category, paired with
    /// the property name of the destination collection.
    pub fn field_specs(&self) -> &'static [FieldSpec] {
        match self {
            Category::Person => PERSON_FIELDS,
            Category::Project => PROJECT_FIELDS,
            Category::Idea => IDEA_FIELDS,
            Category::Admin => ADMIN_FIELDS,
        }
    }

    /// The property free-text context is appended to.
    pub fn note_field(&self) -> &'static str {
        match self {
            Category::Person => "Context",
            _ => "Notes",
        }
    }

    /// Resolve a logical field name to its store property name.
    pub fn store_field(&self, logical: &str) -> Option<&'static str> {
        self.field_specs()
            .iter()
            .find(|spec| spec.logical == logical)
            .map(|spec| spec.store)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "person" => Ok(Category::Person),
            "project" => Ok(Category::Project),
            "idea" => Ok(Category::Idea),
            "admin" => Ok(Category::Admin),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// One logical-to-store field mapping entry.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub logical: &'static str,
    pub store: &'static str,
}

const PERSON_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        logical: "name",
        store: "Name",
    },
    FieldSpec {
        logical: "context",
        store: "Context",
    },
    FieldSpec {
        logical: "follow_ups",
        store: "Follow Ups",
    },
    FieldSpec {
        logical: "nicknames",
        store: "Nicknames",
    },
];

const PROJECT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        logical: "name",
        store: "Name",
    },
    FieldSpec {
        logical: "next_action",
        store: "Next Action",
    },
    FieldSpec {
        logical: "notes",
        store: "Notes",
    },
    FieldSpec {
        logical: "status",
        store: "Status",
    },
];

const IDEA_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        logical: "name",
        store: "Name",
    },
    FieldSpec {
        logical: "one_liner",
        store: "One Liner",
    },
    FieldSpec {
        logical: "notes",
        store: "Notes",
    },
];

const ADMIN_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        logical: "name",
        store: "Name",
    },
    FieldSpec {
        logical: "due_date",
        store: "Due Date",
    },
    FieldSpec {
        logical: "status",
        store: "Status",
    },
];
