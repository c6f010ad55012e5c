use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::StemAudio;

/// Sinc resampling of a whole stem in one pass.
pub(crate) fn resample(audio: &StemAudio, target_sample_rate: u32) -> anyhow::Result<StemAudio> {
    let channels = audio.channels() as usize;
    let input_frames = audio.frames();
    if input_frames == 0 {
        return Ok(StemAudio::new(Vec::new(), target_sample_rate, audio.channels()));
    }

    let ratio = target_sample_rate as f64 / audio.sample_rate() as f64;

    // rubato wants one Vec per channel
    let mut planar = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
    let output = resampler.process(&planar, None)?;

    let output_frames = output[0].len();
    let mut interleaved = Vec::with_capacity(output_frames * channels);
    for frame in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame]);
        }
    }

    Ok(StemAudio::new(interleaved, target_sample_rate, audio.channels()))
}
