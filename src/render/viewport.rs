//! Map extent in the map's spatial reference system.
//!
//! A [`BoundingBox`] is the part of the world a [`Map`](crate::Map) paints
//! onto its `width × height` pixel canvas. It is set explicitly with
//! [`Map::zoom_to_box`](crate::Map::zoom_to_box) or computed by the engine
//! with [`Map::zoom_all`](crate::Map::zoom_all).
//!
//! # Examples
//!
//! ```
//! use mapnik::BoundingBox;
//!
//! let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
//! assert_eq!(world.width(), 360.0);
//! assert!(world.is_valid());
//! ```
//!
//! Combining extents:
//! ```
//! use mapnik::BoundingBox;
//!
//! let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
//! let b = BoundingBox::new(5.0, -5.0, 20.0, 5.0);
//! assert_eq!(a.union(&b), BoundingBox::new(0.0, -5.0, 20.0, 10.0));
//! ```

/// Axis aligned rectangle, `min` corner inclusive.
#[derive(Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for BoundingBox {
    /// The default box is invalid; a map starts without an extent.
    fn default() -> Self {
        Self {
            min_x: -1.0,
            min_y: -1.0,
            max_x: -2.0,
            max_y: -2.0,
        }
    }
}

impl std::fmt::Debug for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl BoundingBox {
    /// Creates a box from its corners. Corners are normalised so that `min <= max`.
    ///
    /// Non-finite corners are kept as given, so the box stays invalid.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Self {
                min_x,
                min_y,
                max_x,
                max_y,
            };
        }
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// A box is valid when all corners are finite and it is not inverted.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y].iter().all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// A valid box that also covers some area.
    pub fn has_area(&self) -> bool {
        self.is_valid() && self.width() > 0.0 && self.height() > 0.0
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_box_is_invalid() {
        assert!(!BoundingBox::default().is_valid());
    }

    #[test]
    fn corners_are_normalised() {
        let b = BoundingBox::new(10.0, 10.0, 0.0, 0.0);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(b.has_area());
    }

    #[test]
    fn degenerate_box_has_no_area() {
        let point = BoundingBox::new(3.0, 3.0, 3.0, 3.0);
        assert!(point.is_valid());
        assert!(!point.has_area());
        assert!(!BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn non_finite_corners_are_kept() {
        let b = BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0);
        assert!(b.min_x.is_nan());
        assert_eq!((b.min_y, b.max_x, b.max_y), (0.0, 1.0, 1.0));
        assert!(!b.has_area());
        assert!(!BoundingBox::new(0.0, f64::INFINITY, 1.0, 1.0).is_valid());
    }

    #[test]
    fn intersection_excludes_touching_edges() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(a.intersects(&BoundingBox::new(0.5, 0.5, 2.0, 2.0)));
        assert!(!a.intersects(&BoundingBox::new(1.0, 0.0, 2.0, 1.0)));
    }
}
