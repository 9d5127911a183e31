//! Microphone capture backed by cpal
//!
//! Cross-platform microphone input. System audio loopback is not something
//! cpal exposes, so the loopback flag is rejected up front with a clear
//! error instead of silently recording the wrong thing.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::{RecorderError, Result};

use super::{AudioFormat, AudioPush, AudioSource};

pub struct CpalSource {
    /// Requested device name; empty selects the host default.
    device_name: String,
    sample_rate: u32,
    channels: u16,
    loopback: bool,
    stream: Option<Stream>,
}

impl CpalSource {
    pub fn new(device_name: &str, sample_rate: u32, channels: u16, loopback: bool) -> Self {
        Self {
            device_name: device_name.to_string(),
            sample_rate,
            channels,
            loopback,
            stream: None,
        }
    }

    fn select_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        if self.device_name.is_empty() {
            return host
                .default_input_device()
                .ok_or_else(|| RecorderError::Audio("no input device available".to_string()));
        }
        let mut devices = host
            .input_devices()
            .map_err(|e| RecorderError::Audio(format!("cannot enumerate devices: {}", e)))?;
        devices
            .find(|d| d.name().map(|n| n == self.device_name).unwrap_or(false))
            .ok_or_else(|| {
                RecorderError::Audio(format!("input device '{}' not found", self.device_name))
            })
    }
}

impl AudioSource for CpalSource {
    fn start(&mut self, push: AudioPush) -> Result<AudioFormat> {
        if self.loopback {
            return Err(RecorderError::Audio(
                "system audio loopback is not supported by the cpal backend; \
                 record the microphone instead"
                    .to_string(),
            ));
        }

        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        tracing::info!(
            "cpal: using audio device: {}",
            device.name().unwrap_or_default()
        );

        let supported = device
            .supported_input_configs()
            .map_err(|e| RecorderError::Audio(format!("cannot query device configs: {}", e)))?;
        let config = find_suitable_config(supported, self.sample_rate, self.channels)?;

        tracing::info!(
            "cpal: audio config: {} Hz, {} channels, {:?}",
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        let stream_config = StreamConfig {
            channels: config.channels(),
            sample_rate: config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let format = AudioFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        let stream = match config.sample_format() {
            SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, push)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, push)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, push)?,
            SampleFormat::I64 => build_stream::<i64>(&device, &stream_config, push)?,
            SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, push)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, push)?,
            SampleFormat::U32 => build_stream::<u32>(&device, &stream_config, push)?,
            SampleFormat::U64 => build_stream::<u64>(&device, &stream_config, push)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, push)?,
            SampleFormat::F64 => build_stream::<f64>(&device, &stream_config, push)?,
            format => {
                return Err(RecorderError::Audio(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| RecorderError::Audio(format!("cannot start audio stream: {}", e)))?;
        self.stream = Some(stream);

        tracing::info!("cpal: audio capture started");
        Ok(format)
    }

    fn stop(&mut self) {
        // Dropping the stream stops the callbacks.
        self.stream.take();
    }

    fn backend_name(&self) -> &'static str {
        "cpal"
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pick a device config: exact channel match at the requested rate first,
/// then any config covering the rate, then whatever the device offers.
fn find_suitable_config(
    configs: cpal::SupportedInputConfigs,
    target_sample_rate: u32,
    target_channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let configs: Vec<_> = configs.collect();

    for config in &configs {
        if config.channels() == target_channels
            && config.min_sample_rate().0 <= target_sample_rate
            && config.max_sample_rate().0 >= target_sample_rate
        {
            return Ok(config
                .clone()
                .with_sample_rate(cpal::SampleRate(target_sample_rate)));
        }
    }

    for config in &configs {
        if config.min_sample_rate().0 <= target_sample_rate
            && config.max_sample_rate().0 >= target_sample_rate
        {
            return Ok(config
                .clone()
                .with_sample_rate(cpal::SampleRate(target_sample_rate)));
        }
    }

    configs
        .into_iter()
        .next()
        .map(|c| c.with_max_sample_rate())
        .ok_or_else(|| RecorderError::Audio("no supported audio configuration found".to_string()))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    push: AudioPush,
) -> Result<Stream>
where
    T: cpal::Sample + cpal::SizedSample + 'static,
    i16: cpal::FromSample<T>,
{
    let err_fn = |err| tracing::error!("audio stream error: {}", err);

    let mut scratch: Vec<i16> = Vec::new();
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                for &sample in data {
                    let sample_i16: i16 = cpal::Sample::from_sample(sample);
                    scratch.push(sample_i16);
                }
                push.push_samples(&scratch);
            },
            err_fn,
            None,
        )
        .map_err(|e| RecorderError::Audio(format!("cannot build audio stream: {}", e)))?;

    Ok(stream)
}
