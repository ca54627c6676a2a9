//! Ties tracking, asset selection and placement together for one user
//! session.
//!
//! Detection and rendering are separate steps: `observe` turns a detector
//! result into an immutable [`TrackingSnapshot`], `render` draws whatever
//! snapshot is latest. The two may run at different cadences.

use image::RgbaImage;
use tracing::{debug, info};

use crate::accessory::AssetSelector;
use crate::catalog::{CatalogConfig, Category, Material, Selection};
use crate::error::SnapshotError;
use crate::placement::{DrawOp, PlacementEngine};
use crate::render::{RenderSurface, draw_all};
use crate::smoothing::{Tracker, TrackingSnapshot};
use crate::snapshot::take_snapshot;
use crate::tracking::Observation;
use crate::video::FacingMode;

pub struct TryOnSession {
    tracker: Tracker,
    assets: AssetSelector,
    engine: PlacementEngine,
    catalog: CatalogConfig,
    selection: Selection,
    pending_facing: Option<FacingMode>,
}

impl TryOnSession {
    pub fn new(engine: PlacementEngine, catalog: CatalogConfig) -> Self {
        Self {
            tracker: Tracker::new(),
            assets: AssetSelector::new(),
            engine,
            catalog,
            selection: Selection::new(),
            pending_facing: None,
        }
    }

    pub fn observe(&mut self, observation: &Observation) -> TrackingSnapshot {
        self.tracker.update(observation)
    }

    pub fn tracking(&self) -> &TrackingSnapshot {
        self.tracker.latest()
    }

    pub fn assets(&self) -> &AssetSelector {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetSelector {
        &mut self.assets
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Commit finished asset loads, then draw the latest snapshot onto
    /// `surface`. Returns the ops that were issued.
    pub fn render<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Vec<DrawOp> {
        self.assets.poll();

        let (width, height) = surface.size();
        let ops = self
            .engine
            .place(self.tracker.latest(), width, height, self.assets.slots());
        draw_all(surface, &ops, self.assets.slots());
        ops
    }

    pub fn snapshot(&self, frame: &RgbaImage) -> Result<RgbaImage, SnapshotError> {
        take_snapshot(frame, self.tracker.latest(), &self.engine, self.assets.slots())
    }

    pub fn select_category(&mut self, category: Category) {
        let facing = self.selection.select_category(category);
        info!("Browsing {category}");
        self.pending_facing = Some(facing);
    }

    pub fn select_material(&mut self, material: Material) {
        if self.selection.select_material(material) {
            self.assets.clear_legacy();
            info!("Browsing {:?}", self.selection.type_name());
        } else {
            debug!("Material has no effect without a face category");
        }
    }

    pub fn next_item(&mut self) {
        if let Some((kind, path)) = self.selection.next_item(&self.catalog) {
            self.assets.request(kind, path);
        }
    }

    pub fn prev_item(&mut self) {
        if let Some((kind, path)) = self.selection.prev_item(&self.catalog) {
            self.assets.request(kind, path);
        }
    }

    /// Camera the last category selection asked for, if not yet handled.
    pub fn take_pending_facing(&mut self) -> Option<FacingMode> {
        self.pending_facing.take()
    }

    /// Landmarks from the previous camera mean nothing for the new one.
    pub fn camera_switched(&mut self) {
        self.tracker.reset();
    }
}
