use std::collections::HashSet;

use crate::error::PortfolioError;
use crate::error::Result;

/// Ordered set of unique asset identifiers. Index `i` is the position of
/// asset `i` in every vector and matrix derived from this universe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetUniverse {
  ids: Vec<String>,
}

impl AssetUniverse {
  /// Build a universe, rejecting empty input, blank ids and duplicates.
  pub fn new<I, S>(ids: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    if ids.is_empty() {
      return Err(PortfolioError::InputValidation(
        "asset universe must contain at least one asset".to_string(),
      ));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for id in &ids {
      if id.trim().is_empty() {
        return Err(PortfolioError::InputValidation(
          "asset identifiers must not be blank".to_string(),
        ));
      }
      if !seen.insert(id.as_str()) {
        return Err(PortfolioError::InputValidation(format!(
          "duplicate asset identifier '{id}'"
        )));
      }
    }

    Ok(Self { ids })
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  /// Always false for a constructed universe.
  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.ids.get(index).map(String::as_str)
  }

  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.ids.iter().position(|x| x == id)
  }

  /// Check that a budget selects between one and all assets.
  pub fn validate_budget(&self, budget: usize) -> Result<()> {
    if budget == 0 || budget > self.len() {
      return Err(PortfolioError::InputValidation(format!(
        "budget must be between 1 and {}, got {budget}",
        self.len()
      )));
    }
    Ok(())
  }
}
