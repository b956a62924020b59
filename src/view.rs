//! View-model seam: where evaluated entities go.

use crate::worker::{Aabb, Entity};

/// 3-D view state: model plus camera.
pub trait ViewModel {
    fn set_model(&mut self, entities: &[Entity]);

    /// Frame `bounds` in the camera, enlarged by `margin`.
    fn fit(&mut self, bounds: Aabb, margin: f64);

    /// Drop the current model (before a reload).
    fn clear(&mut self) {
        self.set_model(&[]);
    }
}

/// Union of all entity bounds; `None` when no entity has bounds.
pub fn bounding_box(entities: &[Entity]) -> Option<Aabb> {
    entities
        .iter()
        .filter_map(|e| e.bounds)
        .reduce(Aabb::union)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(min: [f64; 3], max: [f64; 3]) -> Entity {
        Entity {
            bounds: Some(Aabb { min, max }),
            ..Default::default()
        }
    }

    #[test]
    fn test_bounding_box_union() {
        let entities = vec![
            entity([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
            Entity::default(),
            entity([-2.0, 0.5, 0.0], [0.0, 4.0, 2.0]),
        ];
        let bb = bounding_box(&entities).unwrap();
        assert_eq!(bb.min, [-2.0, 0.0, 0.0]);
        assert_eq!(bb.max, [1.0, 4.0, 2.0]);
    }

    #[test]
    fn test_bounding_box_empty() {
        assert!(bounding_box(&[]).is_none());
        assert!(bounding_box(&[Entity::default()]).is_none());
    }
}
