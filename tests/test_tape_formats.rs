use core::num::NonZeroU32;

use rand::{Rng, SeedableRng};
use rand::rngs::SmallRng;

use spectape::formats::identify::{identify_deep, FileType};
use spectape::formats::tape::{self, Tape, TapeBlock, EdgeFlags};
use spectape::formats::{tap, tzx};
use spectape::utils::deck::TapeDeck;
use spectape::Result;

fn random_rom_block(rng: &mut SmallRng, flag: u8) -> TapeBlock {
    let len = rng.gen_range(1..300usize);
    let mut data = vec![flag];
    data.extend((0..len).map(|_| rng.gen::<u8>()));
    let checksum = data.iter().fold(0, |acc, &x| acc ^ x);
    data.push(checksum);
    TapeBlock::rom(data)
}

fn random_tape(rng: &mut SmallRng) -> Tape {
    let mut tape = Tape::new();
    for _ in 0..rng.gen_range(1..5) {
        tape.append(random_rom_block(rng, 0x00));
        tape.append(random_rom_block(rng, 0xFF));
    }
    tape
}

fn edge_total(tape: &mut Tape) -> Result<u64> {
    let mut total = 0;
    loop {
        let edge = tape.next_edge()?;
        total += u64::from(edge.tstates);
        if edge.flags.contains(EdgeFlags::TAPE) {
            return Ok(total)
        }
    }
}

#[test]
fn test_tap_and_tzx_agree() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0x5EC7A9E);
    for _ in 0..10 {
        let tape = random_tape(&mut rng);
        let tap_file = tap::write(&tape)?;
        let tzx_file = tzx::write(&tape)?;
        let ident = identify_deep(&tzx_file, None)?;
        assert_eq!(FileType::Tzx, ident.file_type);
        let mut from_tap = tape::read(&tap_file, Some("random.tap"))?;
        let mut from_tzx = tape::read(&tzx_file, Some("random.tzx"))?;
        assert_eq!(tape.len(), from_tap.len());
        assert_eq!(tape.blocks(), from_tzx.blocks());
        for (a, b) in from_tap.iter().zip(from_tzx.iter()) {
            assert_eq!(a.data(), b.data());
        }
        assert_eq!(edge_total(&mut from_tap)?, edge_total(&mut from_tzx)?);
    }
    Ok(())
}

#[test]
fn test_deck_copies_tape() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(42);
    let tape = random_tape(&mut rng);
    let mut player = TapeDeck::new_with_tape(tape.clone());
    let mut recorder = TapeDeck::new();
    recorder.insert_as_writer(Tape::new());
    player.play();
    recorder.record();
    let mut frames = 0;
    while player.is_playing() {
        let pulses: Vec<NonZeroU32> = player.ear_pulses(69888)?;
        recorder.record_mic_pulses(pulses);
        frames += 1;
    }
    assert!(frames > 100);
    recorder.record_mic_pulses(core::iter::empty());
    let copy = recorder.eject().unwrap();
    assert_eq!(tape.len(), copy.len());
    for (a, b) in tape.iter().zip(copy.iter()) {
        assert_eq!(a.data(), b.data());
    }
    Ok(())
}
