use approx::assert_relative_eq;
use opl::opl3::{EnvelopeState, Waveform};
use opl::{Frame, Opl3, OplBackend};

const RATE: u32 = 49716;

fn carrier_state(chip: &Opl3, op: usize) -> (EnvelopeState, i32) {
    let op = chip.operator(op).unwrap();
    (op.envelope_state(), op.envelope_volume())
}

/// Two-operator FM voice on channel 0 of bank 0
fn program_voice(chip: &mut Opl3, release: u8) {
    chip.write_register(0x20, 0x21);
    chip.write_register(0x40, 0x10);
    chip.write_register(0x60, 0xf0);
    chip.write_register(0x80, release & 0x0f);
    chip.write_register(0x23, 0x21);
    chip.write_register(0x43, 0x00);
    chip.write_register(0x63, 0xf0);
    chip.write_register(0x83, release & 0x0f);
    chip.write_register(0xc0, 0x00);
}

fn render(chip: &mut Opl3, count: usize) -> Vec<Frame> {
    chip.generate_frames(count)
}

#[test]
fn fastest_attack_reaches_full_level_immediately() {
    let mut chip = Opl3::new(RATE);
    program_voice(&mut chip, 0x0f);
    chip.write_register(0xa0, 0x44);
    chip.write_register(0xb0, 0x32);

    let mut samples = 0;
    while carrier_state(&chip, 1).1 > 0 {
        chip.generate_frame();
        samples += 1;
        assert!(samples <= 2, "attack took more than two samples");
    }
    chip.generate_frame();
    assert_eq!(carrier_state(&chip, 1).0, EnvelopeState::Sustain);
}

#[test]
fn slow_attack_only_rises() {
    let mut chip = Opl3::new(RATE);
    program_voice(&mut chip, 0x0f);
    chip.write_register(0x63, 0x60);
    chip.write_register(0xa0, 0x44);
    chip.write_register(0xb0, 0x32);

    let mut previous = carrier_state(&chip, 1).1;
    let mut samples = 0;
    while carrier_state(&chip, 1).0 == EnvelopeState::Attack {
        chip.generate_frame();
        let volume = carrier_state(&chip, 1).1;
        assert!(volume <= previous, "attenuation grew during attack");
        previous = volume;
        samples += 1;
        assert!(samples < 200_000);
    }
    assert!(samples > 100, "rate 6 attack should be audible as a ramp");
    assert_eq!(previous, 0);
}

/// Frames from key-off until the carrier envelope is off
fn release_length(release: u8) -> u64 {
    let mut chip = Opl3::new(RATE);
    program_voice(&mut chip, release);
    // block 0 keeps the key scale offset at zero
    chip.write_register(0xa0, 0x00);
    chip.write_register(0xb0, 0x21);
    render(&mut chip, 100);
    assert_eq!(carrier_state(&chip, 1), (EnvelopeState::Sustain, 0));

    chip.write_register(0xb0, 0x01);
    let mut samples = 0u64;
    let mut previous = 0;
    while carrier_state(&chip, 1).0 != EnvelopeState::Off {
        chip.generate_frame();
        let volume = carrier_state(&chip, 1).1;
        assert!(volume >= previous, "attenuation fell during release");
        previous = volume;
        samples += 1;
        assert!(samples < 1_000_000);
    }
    samples
}

#[test]
fn release_length_follows_rate_table() {
    let chip = Opl3::new(RATE);
    for release in [8u8, 11, 14] {
        let add = chip.tables().linear_rate(release << 2) as u64;
        let expected = ((511u64 << 24) + add - 1) / add;
        assert_eq!(release_length(release), expected, "release rate {release}");
    }
}

#[test]
fn each_release_step_of_four_doubles_speed() {
    let slow = release_length(8) as f64;
    let fast = release_length(9) as f64;
    assert_relative_eq!(slow / fast, 2.0, max_relative = 0.01);
}

#[test]
fn release_rate_zero_holds_forever() {
    let mut chip = Opl3::new(RATE);
    program_voice(&mut chip, 0x00);
    chip.write_register(0xa0, 0x44);
    chip.write_register(0xb0, 0x32);
    render(&mut chip, 100);
    chip.write_register(0xb0, 0x12);
    render(&mut chip, 20_000);
    assert_eq!(carrier_state(&chip, 1), (EnvelopeState::Release, 0));
    assert!(!chip.is_silent());
}

/// Bass drum operators on channel 6
fn program_bass_drum(chip: &mut Opl3) {
    for (reg, value) in [
        (0x30, 0x01),
        (0x50, 0x10),
        (0x70, 0xf4),
        (0x90, 0x0f),
        (0x33, 0x01),
        (0x53, 0x00),
        (0x73, 0xf4),
        (0x93, 0x0f),
        (0xc6, 0x0e),
        (0xa6, 0x44),
    ] {
        chip.write_register(reg, value);
    }
}

#[test]
fn bass_drum_alone_is_channel_six_doubled() {
    let mut melodic = Opl3::new(RATE);
    program_bass_drum(&mut melodic);
    melodic.write_register(0xb6, 0x32);

    let mut rhythm = Opl3::new(RATE);
    program_bass_drum(&mut rhythm);
    rhythm.write_register(0xb6, 0x12);
    rhythm.write_register(0xbd, 0x30);

    let mut heard = false;
    for _ in 0..2000 {
        let m = melodic.generate_frame();
        let r = rhythm.generate_frame();
        let m_out = melodic.channel_outputs();
        let r_out = rhythm.channel_outputs();
        assert_eq!(r_out[6], m_out[6] * 2);
        assert_eq!(r_out[7], 0);
        assert_eq!(r_out[8], 0);
        assert_eq!(r.left as i32, m.left as i32 * 2);
        assert_eq!(r.left, r.right);
        heard |= m.left != 0;
    }
    assert!(heard);
}

#[test]
fn rhythm_off_releases_drums() {
    let mut chip = Opl3::new(RATE);
    program_bass_drum(&mut chip);
    // sustained envelopes with a short release
    for (reg, value) in [(0x30, 0x21), (0x33, 0x21), (0x90, 0x0a), (0x93, 0x0a)] {
        chip.write_register(reg, value);
    }
    chip.write_register(0xbd, 0x30);
    render(&mut chip, 500);
    assert_ne!(carrier_state(&chip, 13).0, EnvelopeState::Off);

    chip.write_register(0xbd, 0x00);
    assert_eq!(carrier_state(&chip, 13).0, EnvelopeState::Release);
    render(&mut chip, 20_000);
    assert!(chip.is_silent());
}

fn bank_voice(chip: &mut Opl3, bank: u16, pan: u8, fnum_low: u8) {
    for (reg, value) in [
        (0x20, 0x01),
        (0x40, 0x18),
        (0x60, 0xf2),
        (0x80, 0x24),
        (0x23, 0x01),
        (0x43, 0x00),
        (0x63, 0xf2),
        (0x83, 0x24),
        (0xc0, pan),
        (0xa0, fnum_low),
        (0xb0, 0x31),
    ] {
        chip.write_register(bank | reg, value);
    }
}

#[test]
fn drums_follow_channel_six_panning() {
    // C6 bit 4 is left, bit 5 is right
    for (c6, want_left, want_right) in [(0x1e, true, false), (0x2e, false, true)] {
        let mut chip = Opl3::new(RATE);
        chip.write_register(0x105, 0x01);
        program_bass_drum(&mut chip);
        chip.write_register(0xc6, c6);
        chip.write_register(0xb6, 0x12);
        chip.write_register(0xbd, 0x30);

        let frames = render(&mut chip, 2000);
        assert_eq!(frames.iter().any(|f| f.left != 0), want_left);
        assert_eq!(frames.iter().any(|f| f.right != 0), want_right);
    }
}

#[test]
fn second_bank_is_independent() {
    let mut single = Opl3::new(RATE);
    single.write_register(0x105, 0x01);
    bank_voice(&mut single, 0x000, 0x10, 0x44);

    let mut both = Opl3::new(RATE);
    both.write_register(0x105, 0x01);
    bank_voice(&mut both, 0x000, 0x10, 0x44);
    bank_voice(&mut both, 0x100, 0x20, 0x98);

    let mut right_heard = false;
    let mut bank1_active = false;
    for _ in 0..4000 {
        let a = single.generate_frame();
        let b = both.generate_frame();
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, 0);
        assert_eq!(single.channel_outputs()[9], 0);
        right_heard |= b.right != 0;
        bank1_active |= both.channel_outputs()[9] != 0;
    }
    assert!(right_heard);
    assert!(bank1_active);
}

#[test]
fn second_bank_silent_in_opl2_mode() {
    let mut chip = Opl3::new(RATE);
    bank_voice(&mut chip, 0x100, 0x30, 0x44);
    assert!(chip.generate_frames(2000).iter().all(Frame::is_silent));
}

#[test]
fn output_settles_to_silence_after_release() {
    let mut chip = Opl3::new(RATE);
    program_voice(&mut chip, 0x0f);
    chip.write_register(0xa0, 0x44);
    chip.write_register(0xb0, 0x32);
    assert!(render(&mut chip, 2000).iter().any(|f| !f.is_silent()));

    chip.write_register(0xb0, 0x12);
    let mut frames = 0;
    while !chip.is_silent() {
        chip.generate_frame();
        frames += 1;
        assert!(frames < 5000, "voice did not settle");
    }
    assert!(render(&mut chip, 1000).iter().all(Frame::is_silent));
}

#[test]
fn identical_writes_render_identically() {
    let script = |chip: &mut Opl3| {
        chip.write_register(0x105, 0x01);
        chip.write_register(0xbd, 0xc0);
        bank_voice(chip, 0x000, 0x30, 0x44);
        chip.write_register(0x20, 0xc1);
        bank_voice(chip, 0x100, 0x30, 0x81);
    };

    let mut a = Opl3::new(44100);
    let mut b = Opl3::new(44100);
    script(&mut a);
    script(&mut b);
    let first = a.generate_frames(8000);
    assert_eq!(first, b.generate_frames(8000));

    a.reset();
    script(&mut a);
    assert_eq!(first, a.generate_frames(8000));
}

#[test]
fn waveform_select_gates_opl2_waveforms() {
    let mut chip = Opl3::new(RATE);
    chip.write_register(0xe3, 0x02);
    assert_eq!(chip.operator(1).unwrap().waveform(), Waveform::from_register(0));

    chip.write_register(0x01, 0x20);
    assert_eq!(chip.operator(1).unwrap().waveform(), Waveform::from_register(2));

    chip.write_register(0xe3, 0x06);
    assert_eq!(chip.operator(1).unwrap().waveform(), Waveform::from_register(2));

    chip.write_register(0x105, 0x01);
    assert_eq!(chip.operator(1).unwrap().waveform(), Waveform::from_register(6));
}
