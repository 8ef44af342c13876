//! Audio Processing Unit.
//!
//! Four generators (two squares, one of them swept, a wave channel and an
//! LFSR noise channel) are driven by a 512 Hz frame sequencer and mixed into
//! unsigned 8-bit stereo PCM at the host sample rate.

mod envelope;
mod noise;
mod square;
mod wave;

use noise::NoiseChannel;
use square::SquareChannel;
use wave::WaveChannel;

use crate::{CLOCK_HZ, SAMPLE_RATE};

/// T-cycles between two 512 Hz frame-sequencer steps.
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
/// T-cycles between two emitted sample frames.
const SAMPLE_PERIOD: u32 = CLOCK_HZ / SAMPLE_RATE;

/// Distributes length/sweep/envelope ticks to the channels:
///
/// | step    | length | sweep | envelope |
/// |---------|--------|-------|----------|
/// | 0,2,4,6 | tick   |       |          |
/// | 2,6     |        | tick  |          |
/// | 7       |        |       | tick     |
struct FrameSequencer {
    step: u8,
    ticks: u32,
}

impl FrameSequencer {
    fn new() -> Self {
        Self { step: 0, ticks: 0 }
    }

    /// Returns the sequencer step to run this T-cycle, if any.
    fn tick(&mut self) -> Option<u8> {
        self.ticks += 1;
        if self.ticks < FRAME_SEQUENCER_PERIOD {
            return None;
        }
        self.ticks = 0;
        let step = self.step;
        self.step = (self.step + 1) % 8;
        Some(step)
    }
}

pub struct Apu {
    ch1: SquareChannel,
    ch2: SquareChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,

    sequencer: FrameSequencer,
    sample_ticks: u32,

    panning: u8,
    volume_left: u8,
    volume_right: u8,
    vin_left: bool,
    vin_right: bool,
    enabled: bool,
}

impl Apu {
    pub fn new() -> Self {
        let mut apu = Self {
            ch1: SquareChannel::new(true),
            ch2: SquareChannel::new(false),
            ch3: WaveChannel::new(),
            ch4: NoiseChannel::new(),
            sequencer: FrameSequencer::new(),
            sample_ticks: 0,
            panning: 0,
            volume_left: 0,
            volume_right: 0,
            vin_left: false,
            vin_right: false,
            enabled: false,
        };
        apu.reset();
        apu
    }

    pub fn reset(&mut self) {
        self.ch1 = SquareChannel::new(true);
        self.ch2 = SquareChannel::new(false);
        self.ch3 = WaveChannel::new();
        self.ch4 = NoiseChannel::new();
        self.sequencer = FrameSequencer::new();
        self.sample_ticks = 0;
        self.panning = 0;
        self.volume_left = 0;
        self.volume_right = 0;
        self.vin_left = false;
        self.vin_right = false;
        self.enabled = false;
    }

    /// Advance one T-cycle. `play` is true when a fresh stereo frame is
    /// ready for the host.
    pub fn tick(&mut self) -> (u8, u8, bool) {
        // The sequencer and the frequency timers keep running so the APU
        // stays phase-aligned; disabled channels hold their sample at zero.
        if let Some(step) = self.sequencer.tick()
            && self.enabled
        {
            if step % 2 == 0 {
                self.ch1.length_tick();
                self.ch2.length_tick();
                self.ch3.length_tick();
                self.ch4.length_tick();
            }
            if step == 2 || step == 6 {
                self.ch1.sweep_tick();
            }
            if step == 7 {
                self.ch1.envelope_tick();
                self.ch2.envelope_tick();
                self.ch4.envelope_tick();
            }
        }

        self.ch1.tick();
        self.ch2.tick();
        self.ch3.tick();
        self.ch4.tick();

        if !self.enabled {
            return (0, 0, false);
        }

        self.sample_ticks += 1;
        if self.sample_ticks < SAMPLE_PERIOD {
            return (0, 0, false);
        }
        self.sample_ticks = 0;

        let (left_raw, right_raw) = self.pan_and_mix(
            self.ch1.sample(),
            self.ch2.sample(),
            self.ch3.sample(),
            self.ch4.sample(),
        );

        let left = (self.volume_left + 1) * left_raw;
        let right = (self.volume_right + 1) * right_raw;
        (left, right, true)
    }

    /// NR51 routes each channel into the left and/or right lane; the lane
    /// average keeps the sum inside the 4-bit DAC range.
    fn pan_and_mix(&self, c1: u8, c2: u8, c3: u8, c4: u8) -> (u8, u8) {
        let samples = [c1, c2, c3, c4];
        let mut left = 0u16;
        let mut right = 0u16;

        for (index, &sample) in samples.iter().enumerate() {
            if self.panning & (1 << index) != 0 {
                right += sample as u16;
            }
            if self.panning & (1 << (index + 4)) != 0 {
                left += sample as u16;
            }
        }

        ((left / 4) as u8, (right / 4) as u8)
    }

    /// Registers 0xFF10-0xFF3F. While NR52 bit 7 is clear, everything but
    /// NR52 itself and wave RAM ignores writes.
    pub fn write_reg(&mut self, addr: u16, value: u8) {
        if !self.enabled && addr != 0xFF26 && !(0xFF30..=0xFF3F).contains(&addr) {
            return;
        }

        match addr {
            0xFF10 => self.ch1.write_nrx0(value),
            0xFF11 => self.ch1.write_nrx1(value),
            0xFF12 => self.ch1.write_nrx2(value),
            0xFF13 => self.ch1.write_nrx3(value),
            0xFF14 => self.ch1.write_nrx4(value),
            0xFF16 => self.ch2.write_nrx1(value),
            0xFF17 => self.ch2.write_nrx2(value),
            0xFF18 => self.ch2.write_nrx3(value),
            0xFF19 => self.ch2.write_nrx4(value),
            0xFF1A => self.ch3.write_nrx0(value),
            0xFF1B => self.ch3.write_nrx1(value),
            0xFF1C => self.ch3.write_nrx2(value),
            0xFF1D => self.ch3.write_nrx3(value),
            0xFF1E => self.ch3.write_nrx4(value),
            0xFF20 => self.ch4.write_nrx1(value),
            0xFF21 => self.ch4.write_nrx2(value),
            0xFF22 => self.ch4.write_nrx3(value),
            0xFF23 => self.ch4.write_nrx4(value),
            0xFF24 => {
                self.vin_left = value & 0x80 != 0;
                self.volume_left = value >> 4 & 0x07;
                self.vin_right = value & 0x08 != 0;
                self.volume_right = value & 0x07;
            }
            0xFF25 => self.panning = value,
            0xFF26 => self.write_nr52(value),
            0xFF30..=0xFF3F => self.ch3.write_wave_ram((addr - 0xFF30) as u8, value),
            _ => {}
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF10 => self.ch1.read_nrx0(),
            0xFF11 => self.ch1.read_nrx1(),
            0xFF12 => self.ch1.read_nrx2(),
            0xFF14 => self.ch1.read_nrx4(),
            0xFF16 => self.ch2.read_nrx1(),
            0xFF17 => self.ch2.read_nrx2(),
            0xFF19 => self.ch2.read_nrx4(),
            0xFF1A => self.ch3.read_nrx0(),
            0xFF1C => self.ch3.read_nrx2(),
            0xFF1E => self.ch3.read_nrx4(),
            0xFF21 => self.ch4.read_nrx2(),
            0xFF22 => self.ch4.read_nrx3(),
            0xFF23 => self.ch4.read_nrx4(),
            0xFF24 => {
                let vin_left = if self.vin_left { 0x80 } else { 0 };
                let vin_right = if self.vin_right { 0x08 } else { 0 };
                vin_left | self.volume_left << 4 | vin_right | self.volume_right
            }
            0xFF25 => self.panning,
            0xFF26 => self.read_nr52(),
            0xFF30..=0xFF3F => self.ch3.read_wave_ram((addr - 0xFF30) as u8),
            // NR13/NR23/NR31/NR33/NR41 and the gaps are write-only.
            _ => 0xFF,
        }
    }

    fn write_nr52(&mut self, value: u8) {
        let enable = value & 0x80 != 0;
        if self.enabled && !enable {
            self.clear_registers();
            self.ch1.power_off();
            self.ch2.power_off();
            self.ch3.power_off();
            self.ch4.power_off();
        }
        self.enabled = enable;
    }

    fn read_nr52(&self) -> u8 {
        let mut value = 0x70;
        if self.enabled {
            value |= 0x80;
        }
        if self.ch1.is_enabled() {
            value |= 0x01;
        }
        if self.ch2.is_enabled() {
            value |= 0x02;
        }
        if self.ch3.is_enabled() {
            value |= 0x04;
        }
        if self.ch4.is_enabled() {
            value |= 0x08;
        }
        value
    }

    fn clear_registers(&mut self) {
        for addr in 0xFF10..=0xFF25 {
            self.write_reg(addr, 0x00);
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered_apu() -> Apu {
        let mut apu = Apu::new();
        apu.write_reg(0xFF26, 0x80);
        apu
    }

    #[test]
    fn writes_ignored_while_powered_off() {
        let mut apu = Apu::new();
        apu.write_reg(0xFF25, 0xFF);
        assert_eq!(apu.read_reg(0xFF25), 0x00);

        apu.write_reg(0xFF26, 0x80);
        apu.write_reg(0xFF25, 0xFF);
        assert_eq!(apu.read_reg(0xFF25), 0xFF);
    }

    #[test]
    fn power_off_clears_channel_registers() {
        let mut apu = powered_apu();
        apu.write_reg(0xFF25, 0xFF);
        apu.write_reg(0xFF24, 0x77);
        apu.write_reg(0xFF12, 0xF3);

        apu.write_reg(0xFF26, 0x00);
        apu.write_reg(0xFF26, 0x80);
        assert_eq!(apu.read_reg(0xFF25), 0x00);
        assert_eq!(apu.read_reg(0xFF24), 0x00);
        assert_eq!(apu.read_reg(0xFF12), 0x00);
    }

    #[test]
    fn wave_ram_writable_while_powered_off() {
        let mut apu = Apu::new();
        apu.write_reg(0xFF30, 0x5A);
        assert_eq!(apu.read_reg(0xFF30), 0x5A);
    }

    #[test]
    fn nr52_reports_channel_status() {
        let mut apu = powered_apu();
        assert_eq!(apu.read_reg(0xFF26), 0xF0);

        apu.write_reg(0xFF17, 0xF0);
        apu.write_reg(0xFF19, 0x80);
        assert_eq!(apu.read_reg(0xFF26), 0xF2);
    }

    #[test]
    fn triggered_square_reaches_the_output() {
        let mut apu = powered_apu();
        apu.write_reg(0xFF24, 0x77); // full master volume
        apu.write_reg(0xFF25, 0x22); // channel 2 on both lanes? bit1=right
        apu.write_reg(0xFF16, 0x80); // 50% duty
        apu.write_reg(0xFF17, 0xF0); // volume 15
        apu.write_reg(0xFF18, 0x00);
        apu.write_reg(0xFF19, 0x87); // trigger

        let mut produced = false;
        for _ in 0..FRAME_SEQUENCER_PERIOD {
            let (_, right, play) = apu.tick();
            if play && right > 0 {
                produced = true;
                break;
            }
        }
        assert!(produced);
    }

    #[test]
    fn silent_while_disabled() {
        let mut apu = Apu::new();
        for _ in 0..SAMPLE_PERIOD * 4 {
            assert_eq!(apu.tick(), (0, 0, false));
        }
    }
}
