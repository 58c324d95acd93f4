//! Categorical variables.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use bn_common::{Error, Result};

/// A named variable with an ordered list of unique category labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalVariable {
    name: String,
    categories: Vec<String>,
}

impl CategoricalVariable {
    /// Create a variable, rejecting empty or repeated category lists.
    pub fn new(name: impl Into<String>, categories: Vec<String>) -> Result<Self> {
        let name = name.into();
        check_categories(&name, &categories)?;
        Ok(Self { name, categories })
    }

    /// Variable with `n` categories named `value1..valueN`.
    pub fn with_default_categories(name: impl Into<String>, n: usize) -> Result<Self> {
        let categories = (0..n).map(default_category_name).collect();
        Self::new(name, categories)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn category(&self, index: usize) -> Option<&str> {
        self.categories.get(index).map(String::as_str)
    }

    pub fn category_index(&self, label: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == label)
    }

    pub(crate) fn replace_categories(&mut self, categories: Vec<String>) -> Result<()> {
        check_categories(&self.name, &categories)?;
        self.categories = categories;
        Ok(())
    }
}

/// Default label for the category at `index` (zero-based): `value{index + 1}`.
pub fn default_category_name(index: usize) -> String {
    format!("value{}", index + 1)
}

pub(crate) fn check_categories(variable: &str, categories: &[String]) -> Result<()> {
    if categories.is_empty() {
        return Err(Error::Config(format!(
            "variable {variable} needs at least one category"
        )));
    }
    let mut seen = HashSet::with_capacity(categories.len());
    for c in categories {
        if !seen.insert(c.as_str()) {
            return Err(Error::DuplicateCategory {
                variable: variable.to_string(),
                category: c.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_names_are_one_based() {
        let v = CategoricalVariable::with_default_categories("X", 3).unwrap();
        assert_eq!(v.categories(), &labels(&["value1", "value2", "value3"]));
    }

    #[test]
    fn rejects_duplicates() {
        let err = CategoricalVariable::new("X", labels(&["a", "b", "a"])).unwrap_err();
        assert!(matches!(err, Error::DuplicateCategory { ref category, .. } if category == "a"));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            CategoricalVariable::new("X", vec![]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn single_category_is_allowed() {
        let v = CategoricalVariable::new("X", labels(&["only"])).unwrap();
        assert_eq!(v.num_categories(), 1);
    }

    #[test]
    fn lookup_by_label() {
        let v = CategoricalVariable::new("X", labels(&["lo", "hi"])).unwrap();
        assert_eq!(v.category_index("hi"), Some(1));
        assert_eq!(v.category_index("mid"), None);
        assert_eq!(v.category(0), Some("lo"));
        assert_eq!(v.category(2), None);
    }

    #[test]
    fn failed_replace_keeps_old_labels() {
        let mut v = CategoricalVariable::new("X", labels(&["lo", "hi"])).unwrap();
        assert!(v.replace_categories(labels(&["a", "a"])).is_err());
        assert_eq!(v.categories(), &labels(&["lo", "hi"]));
    }
}
