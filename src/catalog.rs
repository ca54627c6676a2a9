//! Jewelry catalog and the user's current browsing position in it.
//!
//! Assets live under `<root>/<type>/<type><n>.png` with `n` starting at 1,
//! where `type` is e.g. `gold_earrings` or `ring`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::accessory::AccessoryKind;
use crate::video::FacingMode;

const DEFAULT_FACE_COUNT: usize = 15;
const DEFAULT_HAND_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Earrings,
    Necklaces,
    Tiara,
    Bracelet,
    Ring,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Earrings,
        Self::Necklaces,
        Self::Tiara,
        Self::Bracelet,
        Self::Ring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earrings => "earrings",
            Self::Necklaces => "necklaces",
            Self::Tiara => "tiara",
            Self::Bracelet => "bracelet",
            Self::Ring => "ring",
        }
    }

    /// Hand categories skip the material step and want the rear camera.
    pub fn is_hand(&self) -> bool {
        matches!(self, Self::Bracelet | Self::Ring)
    }

    pub fn facing(&self) -> FacingMode {
        if self.is_hand() {
            FacingMode::Back
        } else {
            FacingMode::Front
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Material {
    Gold,
    Diamond,
}

impl Material {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Diamond => "diamond",
        }
    }
}

/// Where the assets live and how many items each type has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub asset_root: PathBuf,
    pub counts: HashMap<String, usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let counts = [
            ("gold_earrings", 16),
            ("gold_necklaces", 19),
            ("diamond_earrings", 9),
            ("diamond_necklaces", 6),
            ("bracelet", 7),
            ("ring", 10),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            asset_root: PathBuf::from("assets"),
            counts,
        }
    }
}

impl CatalogConfig {
    pub fn item_count(&self, type_name: &str, category: Category) -> usize {
        self.counts.get(type_name).copied().unwrap_or(if category.is_hand() {
            DEFAULT_HAND_COUNT
        } else {
            DEFAULT_FACE_COUNT
        })
    }

    pub fn item_path(&self, type_name: &str, n: usize) -> PathBuf {
        self.asset_root
            .join(type_name)
            .join(format!("{type_name}{n}.png"))
    }
}

/// UI selection state: category, material and the highlighted item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    category: Option<Category>,
    material: Option<Material>,
    /// 1-based, 0 while nothing is highlighted
    item: usize,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn material(&self) -> Option<Material> {
        self.material
    }

    /// Switch top-level category. Returns the camera this category wants.
    pub fn select_category(&mut self, category: Category) -> FacingMode {
        self.category = Some(category);
        self.material = None;
        self.item = 0;
        category.facing()
    }

    /// Pick gold or diamond for a face category. Returns false (and
    /// changes nothing) for hand categories or without a category.
    pub fn select_material(&mut self, material: Material) -> bool {
        match self.category {
            Some(c) if !c.is_hand() => {
                self.material = Some(material);
                self.item = 0;
                true
            }
            _ => false,
        }
    }

    /// Catalog type name, once enough has been chosen to list items.
    pub fn type_name(&self) -> Option<String> {
        let category = self.category?;
        if category.is_hand() {
            return Some(category.as_str().to_string());
        }
        let material = self.material?;
        Some(format!("{}_{}", material.as_str(), category.as_str()))
    }

    pub fn options(&self, catalog: &CatalogConfig) -> Vec<PathBuf> {
        let (Some(category), Some(type_name)) = (self.category, self.type_name()) else {
            return Vec::new();
        };
        (1..=catalog.item_count(&type_name, category))
            .map(|n| catalog.item_path(&type_name, n))
            .collect()
    }

    pub fn next_item(&mut self, catalog: &CatalogConfig) -> Option<(AccessoryKind, PathBuf)> {
        self.step(catalog, true)
    }

    pub fn prev_item(&mut self, catalog: &CatalogConfig) -> Option<(AccessoryKind, PathBuf)> {
        self.step(catalog, false)
    }

    fn step(&mut self, catalog: &CatalogConfig, forward: bool) -> Option<(AccessoryKind, PathBuf)> {
        let category = self.category?;
        let type_name = self.type_name()?;
        let kind = AccessoryKind::from_type_name(&type_name)?;
        let count = catalog.item_count(&type_name, category);
        if count == 0 {
            return None;
        }

        self.item = match (self.item, forward) {
            (0, true) => 1,
            (0, false) => count,
            (n, true) if n >= count => 1,
            (n, true) => n + 1,
            (1, false) => count,
            (n, false) => n - 1,
        };
        debug!("Highlighted {type_name} #{}", self.item);

        Some((kind, catalog.item_path(&type_name, self.item)))
    }
}
