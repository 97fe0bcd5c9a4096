//! Audio output devices.
//!
//! A [`PlaybackDevice`] is owned by the playback worker thread and nothing else.
//! It is built on that thread through a [`DeviceFactory`] because rodio's
//! `OutputStream` is not `Send` on every platform.

use crate::audio::AudioFrame;
use crate::error::{VoiceError, VoiceResult};
use crate::session::CancelToken;
use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The device reported the frame as fully played.
    Finished,
    /// The cancel token fired; the device was silenced mid-frame.
    Interrupted,
}

/// An output device that plays one frame at a time.
pub trait PlaybackDevice {
    /// Play `frame` and block until it finishes or `cancel` fires.
    fn play(&mut self, frame: &AudioFrame, cancel: &CancelToken) -> VoiceResult<PlayOutcome>;
}

/// Builds the device on the worker thread.
pub type DeviceFactory = Box<dyn FnOnce() -> VoiceResult<Box<dyn PlaybackDevice>> + Send>;

/// Rodio sink on the default (or a named) output device.
pub struct RodioDevice {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Sink,
    halt_poll: Duration,
}

impl RodioDevice {
    /// Open the output whose name contains `device_name` (case-insensitive), or the default output.
    pub fn open(device_name: Option<&str>, halt_poll: Duration) -> VoiceResult<Self> {
        let (stream, handle) = match device_name {
            Some(wanted) => {
                let device = find_output_device(wanted)?;
                info!(
                    "🔊 Using output device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );
                OutputStream::try_from_device(&device)?
            }
            None => OutputStream::try_default()?,
        };
        let sink = Sink::try_new(&handle)?;
        info!("✅ RodioDevice: sink ready for speech playback");
        Ok(Self {
            _stream: stream,
            handle,
            sink,
            halt_poll,
        })
    }

    /// Factory for [`crate::PlaybackWorker`]: the device is opened on the worker thread.
    pub fn factory(device_name: Option<String>, halt_poll: Duration) -> DeviceFactory {
        Box::new(move || {
            let device = RodioDevice::open(device_name.as_deref(), halt_poll)?;
            Ok(Box::new(device) as Box<dyn PlaybackDevice>)
        })
    }

    /// Silence immediately. A stopped sink is replaced so the next frame can play.
    fn halt(&mut self) -> VoiceResult<()> {
        self.sink.stop();
        self.sink = Sink::try_new(&self.handle)?;
        debug!("⏹️ RodioDevice: halted");
        Ok(())
    }
}

impl PlaybackDevice for RodioDevice {
    fn play(&mut self, frame: &AudioFrame, cancel: &CancelToken) -> VoiceResult<PlayOutcome> {
        if frame.is_empty() {
            return Ok(PlayOutcome::Finished);
        }
        self.sink
            .append(SamplesBuffer::new(1, frame.sample_rate, frame.samples.clone()));

        // Poll instead of sleep_until_end so an interrupt is honoured within one tick.
        while !self.sink.empty() {
            if cancel.is_cancelled() {
                self.halt()?;
                return Ok(PlayOutcome::Interrupted);
            }
            std::thread::sleep(self.halt_poll);
        }
        Ok(PlayOutcome::Finished)
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

fn find_output_device(wanted: &str) -> VoiceResult<cpal::Device> {
    let wanted_lower = wanted.to_lowercase();
    let host = cpal::default_host();
    for device in host.output_devices()? {
        match device.name() {
            Ok(name) if name.to_lowercase().contains(&wanted_lower) => return Ok(device),
            Ok(_) => {}
            Err(e) => warn!("Skipping output device with unreadable name: {}", e),
        }
    }
    Err(VoiceError::AudioDevice(format!(
        "No output device matching '{}'",
        wanted
    )))
}

/// List available output devices
pub fn list_output_devices() -> VoiceResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.output_devices()?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            device_names.push(name);
        }
    }

    Ok(device_names)
}
