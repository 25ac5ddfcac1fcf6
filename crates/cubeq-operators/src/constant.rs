//! Dense stream yielding one value at every path of an area.

use std::sync::Arc;

use cubeq_core::area::Area;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};

use crate::traits::CellStream;

pub struct ConstantStream {
    area: Arc<Area>,
    value: f64,
    offset: Option<u64>,
    current: Option<Path>,
}

impl ConstantStream {
    pub fn new(area: Arc<Area>, value: f64) -> Self {
        Self {
            area,
            value,
            offset: None,
            current: None,
        }
    }

    fn exhausted(&self) -> bool {
        self.offset.is_some() && self.current.is_none()
    }
}

impl CellStream for ConstantStream {
    fn next(&mut self) -> Result<bool> {
        let next = match self.offset {
            None => 0,
            Some(_) if self.current.is_none() => return Ok(false),
            Some(o) => o + 1,
        };
        self.offset = Some(next);
        self.current = self.area.path_at(next);
        Ok(self.current.is_some())
    }

    fn key(&self) -> &Path {
        self.current.as_ref().unwrap_or(&EMPTY_PATH)
    }

    fn value(&self) -> Result<f64> {
        match self.current {
            Some(_) => Ok(self.value),
            None => Err(Error::Internal("constant stream read while unpositioned".into())),
        }
    }

    fn reset(&mut self) {
        self.offset = None;
        self.current = None;
    }

    fn seek(&mut self, target: &Path) -> Result<bool> {
        if self.exhausted() {
            return Ok(false);
        }
        if let Some(current) = &self.current {
            if current >= target {
                return Ok(true);
            }
        }
        match self.area.lower_bound(target) {
            Some(path) => {
                self.offset = self.area.offset_of(&path);
                self.current = Some(path);
                Ok(true)
            }
            None => {
                self.offset = Some(self.area.size());
                self.current = None;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::drain;
    use cubeq_core::path;

    #[test]
    fn emits_every_path() {
        let area = Arc::new(Area::from_ids(vec![vec![1, 2], vec![7, 8, 9]]).unwrap());
        let mut s = ConstantStream::new(area, 1.5);
        let cells = drain(&mut s).unwrap();
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| c.value == 1.5));
        assert_eq!(cells[3].path, path![2, 7]);
    }

    #[test]
    fn seek_uses_lower_bound() {
        let area = Arc::new(Area::from_ids(vec![vec![1, 2], vec![7, 9]]).unwrap());
        let mut s = ConstantStream::new(area, 0.0);
        assert!(s.seek(&path![1, 8]).unwrap());
        assert_eq!(s.key(), &path![1, 9]);
        assert!(s.next().unwrap());
        assert_eq!(s.key(), &path![2, 7]);
        assert!(!s.seek(&path![2, 10]).unwrap());
        assert!(!s.next().unwrap());
    }

    #[test]
    fn zero_dimension_area_is_exhausted() {
        let mut s = ConstantStream::new(Arc::new(Area::new(vec![]).unwrap()), 1.0);
        assert!(!s.next().unwrap());
    }
}
