#![forbid(unsafe_code)]

/// Tag decoration relative to a base tag.
///
/// `Cleared` is an explicit null override and only arises when the base tag
/// is non-null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagOverride {
    #[default]
    Unset,
    Cleared,
    Overridden(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdOverride {
    #[default]
    Unset,
    Overridden(i32),
}

/// Tag and id overrides for one base record.
///
/// Overrides are canonical: an override equal to the base value is stored as
/// `Unset`, so two overlays with the same effective values over the same base
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityOverlay {
    tag: TagOverride,
    id: IdOverride,
}

impl IdentityOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_override(&self) -> &TagOverride {
        &self.tag
    }

    pub fn id_override(&self) -> IdOverride {
        self.id
    }

    pub fn is_tag_decorated(&self) -> bool {
        self.tag != TagOverride::Unset
    }

    pub fn is_id_decorated(&self) -> bool {
        self.id != IdOverride::Unset
    }

    pub fn is_decorated(&self) -> bool {
        self.is_tag_decorated() || self.is_id_decorated()
    }

    pub fn effective_tag<'a>(&'a self, base_tag: Option<&'a str>) -> Option<&'a str> {
        match &self.tag {
            TagOverride::Unset => base_tag,
            TagOverride::Cleared => None,
            TagOverride::Overridden(tag) => Some(tag.as_str()),
        }
    }

    pub fn effective_id(&self, base_id: i32) -> i32 {
        match self.id {
            IdOverride::Unset => base_id,
            IdOverride::Overridden(id) => id,
        }
    }

    /// Returns whether the overlay changed.
    pub fn set_tag(&mut self, base_tag: Option<&str>, tag: Option<&str>) -> bool {
        if self.effective_tag(base_tag) == tag {
            return false;
        }
        self.tag = if tag == base_tag {
            TagOverride::Unset
        } else {
            match tag {
                Some(tag) => TagOverride::Overridden(tag.to_string()),
                None => TagOverride::Cleared,
            }
        };
        true
    }

    /// Returns whether the overlay changed.
    pub fn set_id(&mut self, base_id: i32, id: i32) -> bool {
        if self.effective_id(base_id) == id {
            return false;
        }
        self.id = if id == base_id {
            IdOverride::Unset
        } else {
            IdOverride::Overridden(id)
        };
        true
    }
}
