//! Landmark source: receives per-frame face and hand landmark sets from an
//! external MediaPipe helper.
//!
//! The helper runs the face mesh and hand models on frames piped to it
//! and sends one JSON packet per processed frame over UDP. The detector
//! itself is out of scope here; this module only parses, validates and
//! caps what it reports.

use image::{EncodableLayout, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::UdpSocket;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, error, info, warn};

use crate::error::TrackingError;
use crate::landmarks::{FaceLandmarks, HandLandmarks, LandmarkSet};

/// Detector knobs shared with the helper process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub max_faces: usize,
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            max_hands: 2,
            min_detection_confidence: 0.6,
            min_tracking_confidence: 0.6,
        }
    }
}

impl DetectorOptions {
    /// Command line flags understood by the landmark helper.
    pub fn helper_args(&self) -> Vec<String> {
        vec![
            format!("--max-faces={}", self.max_faces),
            format!("--max-hands={}", self.max_hands),
            format!("--min-detection-confidence={}", self.min_detection_confidence),
            format!("--min-tracking-confidence={}", self.min_tracking_confidence),
        ]
    }
}

/// One detector result as sent by the helper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LandmarkPacket {
    #[serde(default)]
    pub faces: Vec<LandmarkSet>,
    #[serde(default)]
    pub hands: Vec<HandPacket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandPacket {
    pub landmarks: LandmarkSet,
    /// Handedness score reported with the hand; absent means "trusted".
    #[serde(default = "default_score")]
    pub score: f32,
}

fn default_score() -> f32 {
    1.0
}

/// Immutable detector output for a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub face: Option<FaceLandmarks>,
    pub hands: Vec<HandLandmarks>,
}

impl Observation {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate a raw packet against the detector topology and options.
    ///
    /// Sets with the wrong number of points are dropped (with a warning)
    /// rather than failing the whole frame.
    pub fn from_packet(packet: LandmarkPacket, options: &DetectorOptions) -> Self {
        let face = packet
            .faces
            .into_iter()
            .take(options.max_faces)
            .find_map(|set| match FaceLandmarks::try_from(set) {
                Ok(face) => Some(face),
                Err(e) => {
                    warn!("Dropping face: {e}");
                    None
                }
            });

        let hands = packet
            .hands
            .into_iter()
            .filter(|hand| {
                let keep = hand.score >= options.min_detection_confidence;
                if !keep {
                    debug!("Dropping hand with score {}", hand.score);
                }
                keep
            })
            .filter_map(|hand| match HandLandmarks::try_from(hand.landmarks) {
                Ok(hand) => Some(hand),
                Err(e) => {
                    warn!("Dropping hand: {e}");
                    None
                }
            })
            .take(options.max_hands)
            .collect();

        Self { face, hands }
    }

    pub fn from_json(json: &[u8], options: &DetectorOptions) -> Result<Self, TrackingError> {
        let packet: LandmarkPacket = serde_json::from_slice(json)
            .map_err(|e| TrackingError::Parse(format!("JSON parse error: {}", e)))?;
        Ok(Self::from_packet(packet, options))
    }

    pub fn from_file<P: AsRef<Path>>(
        path: P,
        options: &DetectorOptions,
    ) -> Result<Self, TrackingError> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            TrackingError::Receiver(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&bytes, options)
    }

    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.hands.is_empty()
    }
}

/// Anything that delivers detector results.
pub trait LandmarkSource {
    /// Most recent observation not yet handed out, or `None` if the detector
    /// has nothing new.
    fn poll(&mut self) -> Result<Option<Observation>, TrackingError>;
}

/// JSON-over-UDP receiver for the MediaPipe helper.
pub struct UdpLandmarkSource {
    socket: UdpSocket,
    options: DetectorOptions,
    buf: Vec<u8>,
}

impl UdpLandmarkSource {
    pub fn bind(addr: &str, options: DetectorOptions) -> Result<Self, TrackingError> {
        let socket = UdpSocket::bind(addr)
            .map_err(|e| TrackingError::Receiver(format!("Failed to bind to {}: {}", addr, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TrackingError::Receiver(format!("Failed to set non-blocking: {}", e)))?;

        info!("Landmark receiver listening on {}", addr);
        Ok(Self {
            socket,
            options,
            buf: vec![0u8; 1 << 17],
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TrackingError> {
        self.socket
            .local_addr()
            .map_err(|e| TrackingError::Receiver(e.to_string()))
    }
}

impl LandmarkSource for UdpLandmarkSource {
    fn poll(&mut self) -> Result<Option<Observation>, TrackingError> {
        let mut latest = None;

        // Drain the socket, keeping only the newest packet
        loop {
            match self.socket.recv(&mut self.buf) {
                Ok(size) if size > 0 => {
                    match Observation::from_json(&self.buf[..size], &self.options) {
                        Ok(observation) => latest = Some(observation),
                        Err(e) => warn!("Skipping landmark packet: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(TrackingError::Receiver(format!("Receive error: {}", e)));
                }
            }
        }

        Ok(latest)
    }
}

/// Landmark helper child process. Raw RGBA frames are piped to its stdin;
/// results come back through a [`UdpLandmarkSource`].
pub struct HelperProcess {
    child: Child,
    width: u32,
    height: u32,
}

impl HelperProcess {
    /// `command` is the program followed by its own arguments. Frame size,
    /// reply address and detector options are appended as flags.
    pub fn spawn(
        command: &[String],
        width: u32,
        height: u32,
        reply_to: &str,
        options: &DetectorOptions,
    ) -> Result<Self, TrackingError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| TrackingError::Receiver("empty helper command".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .arg(format!("--width={width}"))
            .arg(format!("--height={height}"))
            .arg(format!("--target={reply_to}"))
            .args(options.helper_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                TrackingError::Receiver(format!("Failed to launch helper '{program}': {e}"))
            })?;

        info!("Landmark helper started (pid: {}, {width}x{height})", child.id());
        Ok(Self {
            child,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn send_frame(&mut self, img: &RgbaImage) -> Result<(), TrackingError> {
        if img.dimensions() != (self.width, self.height) {
            return Err(TrackingError::Receiver(format!(
                "Frame is {:?}, helper expects {}x{}",
                img.dimensions(),
                self.width,
                self.height
            )));
        }

        if let Some(stdin) = self.child.stdin.as_mut() {
            stdin
                .write_all(img.as_bytes())
                .map_err(|e| TrackingError::Receiver(format!("Helper write failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        drop(self.child.stdin.take());
        if let Err(e) = self.child.kill() {
            error!("Failed to stop landmark helper {e:?}");
        }
        let _ = self.child.wait();
    }
}

/// Landmark stream for the live loop: the UDP receiver plus, when a helper
/// command is configured, the helper feeding it.
pub struct LandmarkFeed {
    source: UdpLandmarkSource,
    helper: Option<HelperProcess>,
    command: Vec<String>,
    options: DetectorOptions,
}

impl LandmarkFeed {
    pub fn new(
        listen: &str,
        command: Vec<String>,
        options: DetectorOptions,
    ) -> Result<Self, TrackingError> {
        let source = UdpLandmarkSource::bind(listen, options.clone())?;
        Ok(Self {
            source,
            helper: None,
            command,
            options,
        })
    }

    /// Hand `frame` to the helper, starting it (or restarting it on a size
    /// change) first. No-op without a helper command.
    pub fn send_frame(&mut self, frame: &RgbaImage) -> Result<(), TrackingError> {
        if self.command.is_empty() {
            return Ok(());
        }

        if self.helper.as_ref().map(|h| h.size()) != Some(frame.dimensions()) {
            drop(self.helper.take());
            let reply_to = self.source.local_addr()?.to_string();
            self.helper = Some(HelperProcess::spawn(
                &self.command,
                frame.width(),
                frame.height(),
                &reply_to,
                &self.options,
            )?);
        }

        match self.helper.as_mut() {
            Some(helper) => helper.send_frame(frame),
            None => Ok(()),
        }
    }

    /// Stop the helper and throw away every packet received so far. The
    /// next frame starts a fresh helper.
    pub fn restart(&mut self) -> Result<(), TrackingError> {
        drop(self.helper.take());
        if self.source.poll()?.is_some() {
            debug!("Discarded queued landmarks");
        }
        Ok(())
    }
}

impl LandmarkSource for LandmarkFeed {
    fn poll(&mut self) -> Result<Option<Observation>, TrackingError> {
        self.source.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{FACE_LANDMARK_COUNT, HAND_LANDMARK_COUNT};

    fn points(n: usize) -> serde_json::Value {
        serde_json::Value::Array((0..n).map(|_| serde_json::json!([0.5, 0.5, 0.0])).collect())
    }

    // Swallows stdin and ignores the flags appended after it
    fn sink_command() -> Vec<String> {
        ["sh", "-c", "cat > /dev/null", "helper"]
            .map(String::from)
            .to_vec()
    }

    fn hand(score: f32) -> serde_json::Value {
        serde_json::json!({ "landmarks": points(HAND_LANDMARK_COUNT), "score": score })
    }

    #[test]
    fn test_packet_caps_faces_and_hands() {
        let json = serde_json::json!({
            "faces": [points(FACE_LANDMARK_COUNT), points(FACE_LANDMARK_COUNT)],
            "hands": [hand(0.9), hand(0.9), hand(0.9)],
        })
        .to_string();

        let obs = Observation::from_json(json.as_bytes(), &DetectorOptions::default()).unwrap();
        assert!(obs.face.is_some());
        assert_eq!(obs.hands.len(), 2);
    }

    #[test]
    fn test_low_confidence_hand_dropped() {
        let json = serde_json::json!({ "hands": [hand(0.3), hand(0.7)] }).to_string();

        let obs = Observation::from_json(json.as_bytes(), &DetectorOptions::default()).unwrap();
        assert!(obs.face.is_none());
        assert_eq!(obs.hands.len(), 1);
    }

    #[test]
    fn test_bad_topology_dropped() {
        let json = serde_json::json!({
            "faces": [points(12)],
            "hands": [{ "landmarks": points(5) }],
        })
        .to_string();

        let obs = Observation::from_json(json.as_bytes(), &DetectorOptions::default()).unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn test_malformed_packet() {
        let res = Observation::from_json(b"{not json", &DetectorOptions::default());
        assert!(matches!(res, Err(TrackingError::Parse(_))));
    }

    #[test]
    fn test_udp_keeps_latest_packet() {
        let mut source =
            UdpLandmarkSource::bind("127.0.0.1:0", DetectorOptions::default()).unwrap();
        let addr = source.local_addr().unwrap();

        assert_eq!(source.poll().unwrap(), None);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let one = serde_json::json!({ "hands": [hand(0.9)] }).to_string();
        let two = serde_json::json!({ "hands": [hand(0.9), hand(0.9)] }).to_string();
        sender.send_to(one.as_bytes(), addr).unwrap();
        sender.send_to(two.as_bytes(), addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let obs = source.poll().unwrap().unwrap();
        assert_eq!(obs.hands.len(), 2);
        assert_eq!(source.poll().unwrap(), None);
    }

    #[test]
    fn test_udp_skips_malformed_packet() {
        let mut source =
            UdpLandmarkSource::bind("127.0.0.1:0", DetectorOptions::default()).unwrap();
        let addr = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let good = serde_json::json!({ "hands": [hand(0.9)] }).to_string();
        sender.send_to(good.as_bytes(), addr).unwrap();
        sender.send_to(b"{not json", addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        let obs = source.poll().unwrap().unwrap();
        assert_eq!(obs.hands.len(), 1);
    }

    #[test]
    fn test_feed_restart_discards_old_landmarks() {
        let command = sink_command();
        let mut feed =
            LandmarkFeed::new("127.0.0.1:0", command, DetectorOptions::default()).unwrap();
        let addr = feed.source.local_addr().unwrap();

        feed.send_frame(&RgbaImage::new(4, 2)).unwrap();
        assert_eq!(feed.helper.as_ref().map(|h| h.size()), Some((4, 2)));

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stale = serde_json::json!({ "hands": [hand(0.9)] }).to_string();
        sender.send_to(stale.as_bytes(), addr).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        feed.restart().unwrap();
        assert!(feed.helper.is_none());
        assert_eq!(feed.poll().unwrap(), None);

        // next frame brings a new helper up
        feed.send_frame(&RgbaImage::new(2, 4)).unwrap();
        assert_eq!(feed.helper.as_ref().map(|h| h.size()), Some((2, 4)));
    }

    #[test]
    fn test_feed_without_helper_command() {
        let mut feed =
            LandmarkFeed::new("127.0.0.1:0", Vec::new(), DetectorOptions::default()).unwrap();
        feed.send_frame(&RgbaImage::new(4, 2)).unwrap();
        assert!(feed.helper.is_none());
    }

    #[test]
    fn test_helper_rejects_wrong_frame_size() {
        let command = sink_command();
        let mut helper =
            HelperProcess::spawn(&command, 4, 2, "127.0.0.1:1", &DetectorOptions::default())
                .unwrap();

        assert!(helper.send_frame(&RgbaImage::new(4, 2)).is_ok());
        assert!(helper.send_frame(&RgbaImage::new(2, 4)).is_err());
    }

    #[test]
    fn test_helper_args() {
        let args = DetectorOptions::default().helper_args();
        assert_eq!(args[0], "--max-faces=1");
        assert_eq!(args[1], "--max-hands=2");
        assert_eq!(args[2], "--min-detection-confidence=0.6");
    }
}
