use image::{EncodableLayout, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

use nokhwa::{
    Camera, nokhwa_initialize,
    pixel_format::RgbAFormat,
    query,
    utils::{ApiBackend, RequestedFormat, RequestedFormatType, Resolution},
};

use crate::error::CaptureError;

/// Which physical camera to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    Front,
    Back,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// v4l2 loopback device name to write to instead of a preview window
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            device: None,
        }
    }
}

// Native backends have no notion of facing; the first enumerated device is
// treated as the front camera and the last as the back one.
fn open_camera(facing: FacingMode, config: &CaptureConfig) -> Result<Camera, CaptureError> {
    nokhwa_initialize(|granted| {
        debug!("User said {}", granted);
    });

    let cameras = query(ApiBackend::Auto)?;
    cameras
        .iter()
        .for_each(|cam| debug!("Found camera: {:?}", cam));

    let info = match facing {
        FacingMode::Front => cameras.first(),
        FacingMode::Back => cameras.last(),
    }
    .ok_or(CaptureError::NoDeviceFound)?;

    let mut camera = Camera::new(
        info.index().clone(),
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
    )?;

    if let Err(e) = camera.set_resolution(Resolution::new(config.width, config.height)) {
        debug!("Keeping default resolution: {e:?}");
    }
    camera.set_frame_rate(config.fps)?;
    camera.open_stream()?;

    info!("Opened {:?} camera {}", facing, info.human_name());
    Ok(camera)
}

/// One capture session at a time. Switching cameras stops and releases the
/// current stream before the next one is opened.
pub struct CaptureSession {
    camera: Option<Camera>,
    facing: FacingMode,
    config: CaptureConfig,
}

impl CaptureSession {
    pub fn open(facing: FacingMode, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let camera = open_camera(facing, config)?;
        Ok(Self {
            camera: Some(camera),
            facing,
            config: config.clone(),
        })
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn switch(&mut self, facing: FacingMode) -> Result<(), CaptureError> {
        if facing == self.facing && self.camera.is_some() {
            return Ok(());
        }

        self.stop();
        self.facing = facing;
        self.camera = Some(open_camera(facing, &self.config)?);
        Ok(())
    }

    pub fn frame(&mut self) -> Result<RgbaImage, CaptureError> {
        let camera = self.camera.as_mut().ok_or(CaptureError::NoDeviceFound)?;
        let frame = camera.frame()?;
        Ok(frame.decode_image::<RgbAFormat>()?)
    }

    pub fn stop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            match camera.stop_stream() {
                Ok(_) => debug!("Stopped {:?} camera", self.facing),
                Err(e) => error!("Failed to stop camera stream: {e:?}"),
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Preview sink: raw RGBA frames piped into ffplay, or ffmpeg writing to a
/// v4l2 loopback device.
pub struct OutputVideoStream {
    output_proc: std::process::Child,
    width: u32,
    height: u32,
}

impl Drop for OutputVideoStream {
    fn drop(&mut self) {
        if let Err(e) = self.output_proc.kill() {
            error!("Failed to stop output process {e:?}");
        }
    }
}

impl OutputVideoStream {
    pub fn new(width: u32, height: u32, device: Option<&str>) -> Result<Self, std::io::Error> {
        let size = format!("{}x{}", width, height);
        let mut command = match device {
            Some(d) => {
                let mut command = Command::new("ffmpeg");
                command.args([
                    "-f", "rawvideo", "-pix_fmt", "rgba", "-s", &size, "-i", "-", "-map", "0:v",
                    "-vf", "format=yuv420p", "-f", "v4l2",
                ]);
                command.arg(format!("/dev/{d}"));
                command
            }
            None => {
                let mut command = Command::new("ffplay");
                command.args([
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    "rgba",
                    "-video_size",
                    &size,
                    "-window_title",
                    "jewel-tryon",
                    "-fflags",
                    "nobuffer",
                    "-flags",
                    "low_delay",
                    "-",
                ]);
                command
            }
        };
        let output_proc = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self {
            output_proc,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn write_frame(&mut self, img: &RgbaImage) -> Result<(), std::io::Error> {
        if let Some(stdin) = self.output_proc.stdin.as_mut() {
            stdin.write_all(img.as_bytes())?;
        }

        Ok(())
    }
}
