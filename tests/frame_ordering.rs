use std::path::PathBuf;

use proptest::prelude::*;

use phaseseq::source::sort_by_file_name;
use phaseseq::{ComposeOpts, KoalaBinSource, NoProgress, StackReader, compose_stack, list_phase_frames};

fn koala_bin(value: f32) -> Vec<u8> {
    let mut b = vec![1u8, 0u8];
    b.extend_from_slice(&23i32.to_le_bytes());
    b.extend_from_slice(&2i32.to_le_bytes());
    b.extend_from_slice(&1i32.to_le_bytes());
    b.extend_from_slice(&1.0e-6f32.to_le_bytes());
    b.extend_from_slice(&1.0f32.to_le_bytes());
    b.push(1);
    for _ in 0..2 {
        b.extend_from_slice(&value.to_le_bytes());
    }
    b
}

fn shuffled_indices() -> impl Strategy<Value = Vec<usize>> {
    (1usize..12).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn name_order_wins_over_listing_order(order in shuffled_indices()) {
        let mut paths: Vec<PathBuf> = order
            .iter()
            .map(|i| PathBuf::from(format!("/acq/{i:05}_phase.bin")))
            .collect();
        sort_by_file_name(&mut paths);
        for (i, p) in paths.iter().enumerate() {
            prop_assert_eq!(p, &PathBuf::from(format!("/acq/{i:05}_phase.bin")));
        }
    }

    #[test]
    fn stack_pages_follow_frame_names(order in shuffled_indices()) {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        std::fs::create_dir(&frames).unwrap();
        for &i in &order {
            std::fs::write(frames.join(format!("{i:05}_phase.bin")), koala_bin(i as f32)).unwrap();
        }

        let files = list_phase_frames(&frames).unwrap();
        let stack = dir.path().join("stack.tif");
        let stats = compose_stack(&KoalaBinSource, &files, &stack, ComposeOpts::default(), &mut NoProgress).unwrap();
        prop_assert_eq!(stats.pages, order.len());

        let mut reader = StackReader::open(&stack).unwrap();
        let mut page = 0usize;
        while let Some(frame) = reader.next_page().unwrap() {
            prop_assert_eq!(frame.data, vec![page as f32; 2]);
            page += 1;
        }
        prop_assert_eq!(page, order.len());
    }
}

#[test]
fn non_bin_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("00001_phase.bin"), koala_bin(1.0)).unwrap();
    std::fs::write(dir.path().join("00000_phase.bin"), koala_bin(0.0)).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    std::fs::create_dir(dir.path().join("sub.bin")).unwrap();

    let files = list_phase_frames(dir.path()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["00000_phase.bin", "00001_phase.bin"]);
}
