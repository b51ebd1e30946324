use matchscan_decoder::{Backend, Configuration, FrameError, SyntheticOptions, read_frame_at};

#[test]
fn synthetic_backend_serves_strided_reads() {
    let config = Configuration {
        backend: Backend::Synthetic,
        input: None,
        synthetic: SyntheticOptions {
            total_frames: 600,
            ..SyntheticOptions::default()
        },
    };
    let mut source = config.create_source().expect("synthetic backend available");
    assert_eq!(source.backend_name(), "synthetic");
    assert_eq!(source.metadata().calculate_total_frames(), Some(600));

    let mut seen = Vec::new();
    for frame_index in (0..600).step_by(60) {
        let frame = read_frame_at(&mut source, frame_index).unwrap();
        assert_eq!(frame.width(), 64);
        seen.push(frame.frame_index());
    }
    assert_eq!(seen.len(), 10);
    assert_eq!(seen[9], Some(540));
}

#[test]
fn reading_past_the_end_is_an_error() {
    let config = Configuration {
        backend: Backend::Synthetic,
        input: None,
        synthetic: SyntheticOptions {
            total_frames: 100,
            ..SyntheticOptions::default()
        },
    };
    let mut source = config.create_source().unwrap();
    assert!(read_frame_at(&mut source, 99).is_ok());
    assert!(matches!(
        read_frame_at(&mut source, 100),
        Err(FrameError::OutOfRange { .. } | FrameError::EndOfStream { .. })
    ));
}

#[test]
fn synthetic_is_always_available() {
    assert!(Configuration::available_backends().contains(&Backend::Synthetic));
}
