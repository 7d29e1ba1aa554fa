//! Operator position provider

use parking_lot::RwLock;

use minetrace_core::GeoPosition;

/// Source of the operator's current geodetic position
pub trait PositionProvider: Send + Sync {
    fn current_position(&self) -> GeoPosition;
}

/// Position that never changes
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub GeoPosition);

impl PositionProvider for FixedPosition {
    fn current_position(&self) -> GeoPosition {
        self.0
    }
}

/// Position updated from outside (GPS feed, UI)
#[derive(Debug, Default)]
pub struct SharedPosition {
    position: RwLock<GeoPosition>,
}

impl SharedPosition {
    pub fn new(position: GeoPosition) -> Self {
        Self {
            position: RwLock::new(position),
        }
    }

    pub fn update(&self, position: GeoPosition) {
        *self.position.write() = position;
    }
}

impl PositionProvider for SharedPosition {
    fn current_position(&self) -> GeoPosition {
        *self.position.read()
    }
}
