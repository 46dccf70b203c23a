use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use gbo_core::{CoreError, GameBoy};
use log::{info, warn};

/// Blocks queued between the emulation loop and the device callback.
const QUEUE_BLOCKS: usize = 4;

/// Interleaved stereo blocks from [`gbo_core::AudioOutput::fill_block`],
/// consumed one frame at a time by the device callback.
struct BlockReader {
    rx: Receiver<Vec<f32>>,
    block: Vec<f32>,
    pos: usize,
}

impl BlockReader {
    fn new(rx: Receiver<Vec<f32>>) -> Self {
        Self {
            rx,
            block: Vec::new(),
            pos: 0,
        }
    }

    /// Next stereo frame, or silence when the queue has run dry.
    fn next_frame(&mut self) -> (f32, f32) {
        if self.pos + 1 >= self.block.len() {
            match self.rx.try_recv() {
                Ok(block) => {
                    self.block = block;
                    self.pos = 0;
                }
                Err(_) => return (0.0, 0.0),
            }
            if self.block.len() < 2 {
                return (0.0, 0.0);
            }
        }
        let frame = (self.block[self.pos], self.block[self.pos + 1]);
        self.pos += 2;
        frame
    }

    fn fill<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T], channels: usize) {
        for frame in data.chunks_mut(channels) {
            let (left, right) = self.next_frame();
            match frame {
                [mono] => *mono = T::from_sample((left + right) * 0.5),
                [l, r, rest @ ..] => {
                    *l = T::from_sample(left);
                    *r = T::from_sample(right);
                    for s in rest {
                        *s = T::EQUILIBRIUM;
                    }
                }
                [] => {}
            }
        }
    }
}

/// Live output stream plus the sending half of its block queue.
pub struct AudioSink {
    _stream: cpal::Stream,
    tx: Sender<Vec<f32>>,
    sample_rate: u32,
}

impl AudioSink {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Move finished blocks from the core to the device queue, keeping the
    /// core's minimum buffer in reserve.
    pub fn pump(&self, gb: &mut GameBoy) -> Result<(), CoreError> {
        let Some(audio) = gb.audio_output_mut() else {
            return Ok(());
        };
        while audio.remaining_buffer() > audio.min_buffer() && !self.tx.is_full() {
            let block = audio.fill_block()?;
            match self.tx.try_send(block) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => break,
                Err(TrySendError::Disconnected(_)) => {
                    warn!("audio device went away");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn build_stream<T: SizedSample + FromSample<f32>>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: BlockReader,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _| reader.fill(data, channels),
        |err| warn!("audio stream error: {err}"),
        None,
    )
}

/// Open the default output device. Returns `None` (after logging why) when
/// there is no usable device; emulation then runs silent.
pub fn start_stream() -> Option<AudioSink> {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        warn!("no audio output device");
        return None;
    };
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            warn!("no supported output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let (tx, rx) = crossbeam_channel::bounded(QUEUE_BLOCKS);
    let reader = BlockReader::new(rx);

    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, reader),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, reader),
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, reader),
        other => {
            warn!("unsupported sample format {other:?}");
            return None;
        }
    };
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to open audio stream: {e}");
            return None;
        }
    };
    if let Err(e) = stream.play() {
        warn!("failed to start audio stream: {e}");
        return None;
    }

    info!(
        "audio: {} Hz, {} channel(s), {sample_format:?}",
        config.sample_rate, config.channels
    );
    Some(AudioSink {
        _stream: stream,
        tx,
        sample_rate: config.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::Sample;

    #[test]
    fn reader_walks_blocks_then_goes_silent() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        tx.send(vec![0.5, -0.5]).unwrap();
        tx.send(vec![0.25, 0.75, 1.0, 0.0]).unwrap();
        let mut reader = BlockReader::new(rx);

        assert_eq!(reader.next_frame(), (0.5, -0.5));
        assert_eq!(reader.next_frame(), (0.25, 0.75));
        assert_eq!(reader.next_frame(), (1.0, 0.0));
        assert_eq!(reader.next_frame(), (0.0, 0.0), "underrun plays silence");
    }

    #[test]
    fn fill_adapts_to_device_channels() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(vec![1.0, 0.0, 0.5, 0.5]).unwrap();
        let mut reader = BlockReader::new(rx);

        let mut mono = [0.0f32; 1];
        reader.fill(&mut mono, 1);
        assert_eq!(mono, [0.5]);

        let mut quad = [9.0f32; 4];
        reader.fill(&mut quad, 4);
        assert_eq!(quad, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn integer_formats_convert_from_float() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(vec![0.0, 0.0]).unwrap();
        let mut reader = BlockReader::new(rx);
        let mut out = [1u16; 2];
        reader.fill(&mut out, 2);
        assert_eq!(out, [u16::EQUILIBRIUM; 2]);
    }
}
