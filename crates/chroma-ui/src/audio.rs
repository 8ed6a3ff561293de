use chroma_core::audio_queue::SampleConsumer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Start audio playback, draining the core's sample queue from the cpal
/// callback. Returns the active stream, which must stay alive for playback
/// to continue.
pub fn start_stream(queue: SampleConsumer) -> Option<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("no supported output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let err_fn = |err| eprintln!("cpal stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    for frame in data.chunks_mut(channels) {
                        let [left, right] = queue.pop().unwrap_or([0, 0]);
                        frame[0] = (left as i16) << 8;
                        if channels > 1 {
                            frame[1] = (right as i16) << 8;
                        }
                    }
                },
                err_fn,
                None,
            )
            .ok()?,
        cpal::SampleFormat::U16 => device
            .build_output_stream(
                &config,
                move |data: &mut [u16], _| {
                    for frame in data.chunks_mut(channels) {
                        let [left, right] = queue.pop().unwrap_or([0, 0]);
                        frame[0] = ((left as i32 + 128) << 8) as u16;
                        if channels > 1 {
                            frame[1] = ((right as i32 + 128) << 8) as u16;
                        }
                    }
                },
                err_fn,
                None,
            )
            .ok()?,
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    for frame in data.chunks_mut(channels) {
                        let [left, right] = queue.pop().unwrap_or([0, 0]);
                        frame[0] = left as f32 / 128.0;
                        if channels > 1 {
                            frame[1] = right as f32 / 128.0;
                        }
                    }
                },
                err_fn,
                None,
            )
            .ok()?,
        _ => {
            eprintln!("unsupported sample format {sample_format:?}");
            return None;
        }
    };

    if let Err(e) = stream.play() {
        eprintln!("failed to start audio stream: {e}");
        return None;
    }
    Some(stream)
}
