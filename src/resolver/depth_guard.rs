use super::errors::ResolveError;
use super::path_index::abs_path;
use crate::request::keys::split_path;

/// Bounds how deep one request may nest.
///
/// Depth of a node is the number of segments of its parent path plus one.
/// It is only measured at array position 0; later rows of the same array sit
/// at the same depth.
#[derive(Debug, Clone)]
pub struct DepthGuard {
    deepest: usize,
    ceiling: usize,
}

impl DepthGuard {
    pub fn new(ceiling: usize) -> Self {
        Self {
            deepest: 0,
            ceiling,
        }
    }

    pub fn enter(&mut self, parent_path: &str, name: &str, position: usize) -> Result<(), ResolveError> {
        if position != 0 {
            return Ok(());
        }
        let depth = split_path(parent_path).len() + 1;
        if depth > self.deepest {
            self.deepest = depth;
            if depth > self.ceiling {
                return Err(ResolveError::Structure(format!(
                    "{}:{{}} has depth {}, which exceeds the limit of 1-{}",
                    abs_path(parent_path, name),
                    depth,
                    self.ceiling
                )));
            }
        }
        Ok(())
    }

    pub fn deepest(&self) -> usize {
        self.deepest
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}
