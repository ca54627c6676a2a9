//! Accessory slots and the asset selector that fills them.

use image::RgbaImage;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::error::AssetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessoryKind {
    Earring,
    Necklace,
    Tiara,
    Bracelet,
    Ring,
}

impl AccessoryKind {
    /// Slots covered by the exclusive earring/necklace rule.
    pub const LEGACY: [AccessoryKind; 2] = [Self::Earring, Self::Necklace];

    /// Earrings and necklaces share the older exclusive selection flow:
    /// picking either clears both.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Earring | Self::Necklace)
    }

    /// Map a catalog type name such as `gold_earrings` to its slot.
    pub fn from_type_name(name: &str) -> Option<Self> {
        // "earrings" must be checked before "ring"
        if name.contains("earring") {
            Some(Self::Earring)
        } else if name.contains("necklace") {
            Some(Self::Necklace)
        } else if name.contains("tiara") {
            Some(Self::Tiara)
        } else if name.contains("bracelet") {
            Some(Self::Bracelet)
        } else if name.contains("ring") {
            Some(Self::Ring)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earring => "earring",
            Self::Necklace => "necklace",
            Self::Tiara => "tiara",
            Self::Bracelet => "bracelet",
            Self::Ring => "ring",
        }
    }
}

impl fmt::Display for AccessoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Committed image per accessory kind.
#[derive(Debug, Clone, Default)]
pub struct AccessorySlots {
    images: HashMap<AccessoryKind, Arc<RgbaImage>>,
}

impl AccessorySlots {
    pub fn get(&self, kind: AccessoryKind) -> Option<&Arc<RgbaImage>> {
        self.images.get(&kind)
    }

    pub fn set(&mut self, kind: AccessoryKind, img: Arc<RgbaImage>) {
        self.images.insert(kind, img);
    }

    pub fn clear(&mut self, kind: AccessoryKind) {
        self.images.remove(&kind);
    }

    pub fn clear_legacy(&mut self) {
        for kind in AccessoryKind::LEGACY {
            self.clear(kind);
        }
    }
}

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage, AssetError> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| AssetError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(img.into_rgba8())
}

/// Result of a background load, delivered back to the selector.
#[derive(Debug)]
pub struct LoadOutcome {
    pub kind: AccessoryKind,
    pub path: PathBuf,
    /// Slot generation at the time the load was requested
    pub generation: u64,
    pub result: Result<RgbaImage, AssetError>,
}

fn spawn_load(
    kind: AccessoryKind,
    path: PathBuf,
    generation: u64,
    tx: flume::Sender<LoadOutcome>,
) {
    thread::spawn(move || {
        let result = load_image(&path);
        // receiver gone means the selector was dropped, nothing to commit to
        let _ = tx.send(LoadOutcome {
            kind,
            path,
            generation,
            result,
        });
    });
}

/// Owns the accessory slots. Loads happen off the frame loop; only
/// finished, successful loads of the latest selection for a slot are ever
/// committed.
pub struct AssetSelector {
    slots: AccessorySlots,
    generations: HashMap<AccessoryKind, u64>,
    tx: flume::Sender<LoadOutcome>,
    rx: flume::Receiver<LoadOutcome>,
}

impl Default for AssetSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetSelector {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            slots: AccessorySlots::default(),
            generations: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn slots(&self) -> &AccessorySlots {
        &self.slots
    }

    /// Commit `img` to `kind` right away, superseding any load still in
    /// flight for it.
    pub fn commit(&mut self, kind: AccessoryKind, img: Arc<RgbaImage>) {
        self.supersede(kind);
        self.store(kind, img);
    }

    fn store(&mut self, kind: AccessoryKind, img: Arc<RgbaImage>) {
        if kind.is_legacy() {
            self.slots.clear_legacy();
        }
        if kind == AccessoryKind::Tiara {
            warn!("Tiara selected but tiara placement is not implemented; it will not be drawn");
        }
        self.slots.set(kind, img);
    }

    pub fn clear_legacy(&mut self) {
        for kind in AccessoryKind::LEGACY {
            self.bump(kind);
        }
        self.slots.clear_legacy();
    }

    fn generation(&self, kind: AccessoryKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or_default()
    }

    fn bump(&mut self, kind: AccessoryKind) -> u64 {
        let generation = self.generations.entry(kind).or_default();
        *generation += 1;
        *generation
    }

    /// Invalidate pending loads for `kind`. A legacy kind also invalidates
    /// the other legacy slot, since committing it would clear that one.
    fn supersede(&mut self, kind: AccessoryKind) -> u64 {
        if kind.is_legacy() {
            for other in AccessoryKind::LEGACY {
                if other != kind {
                    self.bump(other);
                }
            }
        }
        self.bump(kind)
    }

    /// Start loading `path` into `kind` in the background. Call [`poll`]
    /// from the frame loop to commit it.
    ///
    /// [`poll`]: AssetSelector::poll
    pub fn request<P: Into<PathBuf>>(&mut self, kind: AccessoryKind, path: P) {
        let path = path.into();
        let generation = self.supersede(kind);
        debug!("Loading {kind} from {} (generation {generation})", path.display());
        spawn_load(kind, path, generation, self.tx.clone());
    }

    /// Commit every load that has finished since the last call. Loads
    /// superseded by a newer request are dropped. Returns the number of
    /// slots that changed.
    pub fn poll(&mut self) -> usize {
        let mut committed = 0;
        while let Ok(outcome) = self.rx.try_recv() {
            if let Ok(true) = self.apply(outcome) {
                committed += 1;
            }
        }
        committed
    }

    /// Load `path` and commit it to `kind`, waiting for the result.
    pub async fn change<P: Into<PathBuf>>(
        &mut self,
        kind: AccessoryKind,
        path: P,
    ) -> Result<(), AssetError> {
        let path = path.into();
        let generation = self.supersede(kind);
        let (tx, rx) = flume::bounded(1);
        spawn_load(kind, path.clone(), generation, tx);

        let outcome = rx
            .recv_async()
            .await
            .map_err(|_| AssetError::Disconnected(path))?;
        self.apply(outcome).map(|_| ())
    }

    /// `Ok(false)` when the outcome was superseded and discarded.
    fn apply(&mut self, outcome: LoadOutcome) -> Result<bool, AssetError> {
        if outcome.generation != self.generation(outcome.kind) {
            debug!(
                "Discarding stale {} load of {}",
                outcome.kind,
                outcome.path.display()
            );
            return Ok(false);
        }

        match outcome.result {
            Ok(img) => {
                info!("Selected {} from {}", outcome.kind, outcome.path.display());
                self.store(outcome.kind, Arc::new(img));
                Ok(true)
            }
            Err(e) => {
                error!("{e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn img(w: u32, h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    fn write_png(name: &str) -> PathBuf {
        write_sized_png(name, 4, 2)
    }

    fn write_sized_png(name: &str, w: u32, h: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("jewel-tryon-{}-{name}", std::process::id()));
        RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn loaded(kind: AccessoryKind, generation: u64, size: u32) -> LoadOutcome {
        LoadOutcome {
            kind,
            path: PathBuf::from(format!("{kind}{size}.png")),
            generation,
            result: Ok(RgbaImage::new(size, size)),
        }
    }

    #[test]
    fn test_type_names() {
        assert_eq!(AccessoryKind::from_type_name("gold_earrings"), Some(AccessoryKind::Earring));
        assert_eq!(
            AccessoryKind::from_type_name("diamond_necklaces"),
            Some(AccessoryKind::Necklace)
        );
        assert_eq!(AccessoryKind::from_type_name("ring"), Some(AccessoryKind::Ring));
        assert_eq!(AccessoryKind::from_type_name("bracelet"), Some(AccessoryKind::Bracelet));
        assert_eq!(AccessoryKind::from_type_name("gold_tiara"), Some(AccessoryKind::Tiara));
        assert_eq!(AccessoryKind::from_type_name("anklet"), None);
    }

    #[test]
    fn test_legacy_exclusion() {
        let mut selector = AssetSelector::new();
        selector.commit(AccessoryKind::Earring, img(1, 1));
        selector.commit(AccessoryKind::Necklace, img(2, 2));

        assert!(selector.slots().get(AccessoryKind::Earring).is_none());
        assert!(selector.slots().get(AccessoryKind::Necklace).is_some());
    }

    #[test]
    fn test_other_slots_independent() {
        let mut selector = AssetSelector::new();
        selector.commit(AccessoryKind::Bracelet, img(1, 1));
        selector.commit(AccessoryKind::Earring, img(1, 1));
        selector.commit(AccessoryKind::Ring, img(1, 1));

        for kind in [AccessoryKind::Bracelet, AccessoryKind::Earring, AccessoryKind::Ring] {
            assert!(selector.slots().get(kind).is_some(), "{kind} was cleared");
        }
    }

    #[test]
    fn test_change_loads_image() {
        let path = write_png("change.png");
        let mut selector = AssetSelector::new();

        pollster::block_on(selector.change(AccessoryKind::Ring, &path)).unwrap();
        let ring = selector.slots().get(AccessoryKind::Ring).unwrap();
        assert_eq!(ring.dimensions(), (4, 2));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_failed_load_leaves_slots() {
        let mut selector = AssetSelector::new();
        selector.commit(AccessoryKind::Earring, img(3, 3));

        let res = pollster::block_on(
            selector.change(AccessoryKind::Necklace, "/nonexistent/necklace.png"),
        );
        assert!(matches!(res, Err(AssetError::Load { .. })));
        assert_eq!(
            selector.slots().get(AccessoryKind::Earring).unwrap().dimensions(),
            (3, 3)
        );
        assert!(selector.slots().get(AccessoryKind::Necklace).is_none());
    }

    #[test]
    fn test_request_then_poll() {
        let path = write_png("request.png");
        let mut selector = AssetSelector::new();
        selector.request(AccessoryKind::Bracelet, &path);
        selector.request(AccessoryKind::Ring, "/nonexistent/ring.png");

        for _ in 0..400 {
            selector.poll();
            if selector.slots().get(AccessoryKind::Bracelet).is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        selector.poll();

        assert!(selector.slots().get(AccessoryKind::Bracelet).is_some());
        assert!(selector.slots().get(AccessoryKind::Ring).is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_newer_request_wins_regardless_of_arrival() {
        let mut selector = AssetSelector::new();
        let older = selector.supersede(AccessoryKind::Earring);
        let newer = selector.supersede(AccessoryKind::Earring);

        selector.tx.send(loaded(AccessoryKind::Earring, newer, 2)).unwrap();
        selector.tx.send(loaded(AccessoryKind::Earring, older, 30)).unwrap();

        assert_eq!(selector.poll(), 1);
        let earring = selector.slots().get(AccessoryKind::Earring).unwrap();
        assert_eq!(earring.dimensions(), (2, 2));
    }

    #[test]
    fn test_clear_legacy_drops_pending_loads() {
        let mut selector = AssetSelector::new();
        let earring = selector.supersede(AccessoryKind::Earring);
        let ring = selector.supersede(AccessoryKind::Ring);

        selector.clear_legacy();
        selector.tx.send(loaded(AccessoryKind::Earring, earring, 2)).unwrap();
        selector.tx.send(loaded(AccessoryKind::Ring, ring, 2)).unwrap();

        assert_eq!(selector.poll(), 1);
        assert!(selector.slots().get(AccessoryKind::Earring).is_none());
        assert!(selector.slots().get(AccessoryKind::Ring).is_some());
    }

    #[test]
    fn test_necklace_request_supersedes_pending_earring() {
        let mut selector = AssetSelector::new();
        let earring = selector.supersede(AccessoryKind::Earring);
        let necklace = selector.supersede(AccessoryKind::Necklace);

        selector.tx.send(loaded(AccessoryKind::Necklace, necklace, 2)).unwrap();
        selector.tx.send(loaded(AccessoryKind::Earring, earring, 2)).unwrap();

        assert_eq!(selector.poll(), 1);
        assert!(selector.slots().get(AccessoryKind::Necklace).is_some());
        assert!(selector.slots().get(AccessoryKind::Earring).is_none());
    }

    #[test]
    fn test_slow_older_request_does_not_overwrite() {
        let big = write_sized_png("slow-big.png", 1500, 1500);
        let small = write_sized_png("slow-small.png", 2, 2);
        let mut selector = AssetSelector::new();

        selector.request(AccessoryKind::Earring, &big);
        selector.request(AccessoryKind::Earring, &small);

        for _ in 0..400 {
            selector.poll();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let earring = selector.slots().get(AccessoryKind::Earring).unwrap();
        assert_eq!(earring.dimensions(), (2, 2));

        let _ = std::fs::remove_file(big);
        let _ = std::fs::remove_file(small);
    }
}
