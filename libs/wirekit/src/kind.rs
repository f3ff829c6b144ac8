use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Nominal identity of a component type: one vertex of the component graph.
///
/// Two kinds are equal only when they name the same Rust type, so newtypes over
/// the same inner value are distinct kinds.
#[derive(Clone, Copy)]
pub struct Kind {
    id: TypeId,
    name: &'static str,
}

impl Kind {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Kind {}

impl Hash for Kind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Port(#[allow(dead_code)] u16);
    struct AdminPort(#[allow(dead_code)] u16);

    #[test]
    fn newtypes_are_distinct_kinds() {
        assert_ne!(Kind::of::<Port>(), Kind::of::<AdminPort>());
        assert_eq!(Kind::of::<Port>(), Kind::of::<Port>());
    }

    #[test]
    fn display_uses_type_name() {
        let kind = Kind::of::<Port>();
        assert!(kind.to_string().ends_with("Port"));
        assert_eq!(format!("{kind:?}"), kind.name());
    }
}
