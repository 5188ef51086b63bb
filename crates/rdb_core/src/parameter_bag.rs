use crate::provider::ParameterDirection;
use crate::value::{DbType, Value};

/// A single bound parameter as tracked by a `ParameterBag`, independent of
/// any particular provider's `Parameter` implementation.
#[derive(Debug, Clone)]
pub struct BoundParameter {
    pub name: String,
    pub db_type: DbType,
    pub value: Value,
    pub direction: ParameterDirection,
}

/// Lightweight handle returned by `add_parameter_with_value`, letting the
/// caller reference the parameter it just added (by its allocated or
/// supplied name) without holding a borrow into the bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterHandle {
    pub name: String,
}

/// An insertion-ordered bag of bound parameters backing a `SqlContainer`.
/// Order matters for positional-placeholder dialects, so parameters are
/// kept in a plain `Vec`; lookup by name is a linear scan, which is fine at
/// the parameter counts a single statement realistically uses.
#[derive(Debug, Clone, Default)]
pub struct ParameterBag {
    parameters: Vec<BoundParameter>,
    next_auto_index: usize,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParameter> {
        self.parameters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Adds a parameter, allocating a unique name (`p0`, `p1`, …) when
    /// `name` is `None`. Returns a handle naming the parameter actually
    /// stored. An explicit name that collides with an existing one
    /// overwrites that parameter's value/type/direction in place, keeping
    /// its original position.
    pub fn add_parameter_with_value(
        &mut self,
        name: Option<&str>,
        db_type: DbType,
        value: Value,
        direction: ParameterDirection,
    ) -> ParameterHandle {
        self.add_parameter_with_value_prefixed(name, db_type, value, direction, "p")
    }

    /// Same as `add_parameter_with_value`, but auto-allocated names use
    /// `prefix` instead of `p` — e.g. `w0`, `w1`, … for a `WHERE … IN`
    /// parameter list, or `k0`, `k1`, … for a composite-primary-key lookup.
    pub fn add_parameter_with_value_prefixed(
        &mut self,
        name: Option<&str>,
        db_type: DbType,
        value: Value,
        direction: ParameterDirection,
        prefix: &str,
    ) -> ParameterHandle {
        let resolved_name = match name {
            Some(name) => name.to_string(),
            None => self.allocate_name(prefix),
        };

        if let Some(existing) = self.parameters.iter_mut().find(|p| p.name == resolved_name) {
            existing.db_type = db_type;
            existing.value = value;
            existing.direction = direction;
        } else {
            self.parameters.push(BoundParameter {
                name: resolved_name.clone(),
                db_type,
                value,
                direction,
            });
        }

        ParameterHandle { name: resolved_name }
    }

    fn allocate_name(&mut self, prefix: &str) -> String {
        loop {
            let candidate = format!("{prefix}{}", self.next_auto_index);
            self.next_auto_index += 1;
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Resets the bag to empty. The caller is responsible for also
    /// resetting its query buffer and `has_where_appended` flag.
    pub fn clear(&mut self) {
        self.parameters.clear();
        self.next_auto_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_parameters_get_sequential_names() {
        let mut bag = ParameterBag::new();
        let h1 = bag.add_parameter_with_value(None, DbType::Int32, Value::Int(1), ParameterDirection::Input);
        let h2 = bag.add_parameter_with_value(None, DbType::Int32, Value::Int(2), ParameterDirection::Input);

        assert_eq!(h1.name, "p0");
        assert_eq!(h2.name, "p1");
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn named_parameter_with_same_name_overwrites_in_place() {
        let mut bag = ParameterBag::new();
        bag.add_parameter_with_value(Some("id"), DbType::Int32, Value::Int(1), ParameterDirection::Input);
        bag.add_parameter_with_value(Some("id"), DbType::Int32, Value::Int(2), ParameterDirection::Input);

        assert_eq!(bag.len(), 1);
        assert_eq!(bag.get("id").unwrap().value, Value::Int(2));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut bag = ParameterBag::new();
        bag.add_parameter_with_value(Some("b"), DbType::Int32, Value::Int(2), ParameterDirection::Input);
        bag.add_parameter_with_value(Some("a"), DbType::Int32, Value::Int(1), ParameterDirection::Input);

        let names: Vec<&str> = bag.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn clear_resets_bag_and_name_allocator() {
        let mut bag = ParameterBag::new();
        bag.add_parameter_with_value(None, DbType::Int32, Value::Int(1), ParameterDirection::Input);
        bag.clear();

        assert!(bag.is_empty());
        let handle = bag.add_parameter_with_value(None, DbType::Int32, Value::Int(9), ParameterDirection::Input);
        assert_eq!(handle.name, "p0");
    }
}
