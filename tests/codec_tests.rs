//! Decoding real container formats through the whole player.
//!
//! Assets are assembled in code: an M4A holding raw AAC-LC frames and a
//! constant bitrate MP3, both silent but structurally complete.

use flashplay::board::HostBoard;
use flashplay::config::{AssetKind, ClockConfig, PlayerConfig};
use flashplay::driver::{ExitReason, Player};
use flashplay::format::MusicInfo;
use flashplay::io::AssetStream;
use flashplay::output::MemoryOutput;

#[allow(dead_code)]
fn player(kind: AssetKind) -> Player<HostBoard> {
    let config = PlayerConfig::default()
        .with_asset_kind(kind)
        .with_stop_on_sink_error(true);
    Player::new(config, HostBoard::init().unwrap()).unwrap()
}

#[cfg(feature = "audio-aac")]
mod m4a {
    use super::*;
    use flashplay::element::ElementErrorKind;

    // One AAC-LC single channel element with no spectral data, then END.
    const SILENT_FRAME: [u8; 4] = [0x01, 0x40, 0x20, 0x07];
    // AudioSpecificConfig: AAC-LC, 16 kHz, mono.
    const ASC: [u8; 2] = [0x14, 0x08];
    const RATE: u32 = 16_000;

    fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    // Atom with a zero version and flags word.
    fn full_atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut versioned = vec![0u8; 4];
        versioned.extend_from_slice(body);
        atom(kind, &versioned)
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn ftyp() -> Vec<u8> {
        atom(b"ftyp", b"M4A \0\0\0\0M4A isom")
    }

    fn esds() -> Vec<u8> {
        let mut es = vec![0x03, 25, 0x00, 0x01, 0x00];
        // DecoderConfigDescriptor: MPEG-4 audio, audio stream.
        es.extend_from_slice(&[0x04, 17, 0x40, 0x15]);
        es.extend_from_slice(&[0u8; 11]);
        es.extend_from_slice(&[0x05, ASC.len() as u8]);
        es.extend_from_slice(&ASC);
        // SLConfigDescriptor: predefined MP4.
        es.extend_from_slice(&[0x06, 1, 0x02]);
        full_atom(b"esds", &es)
    }

    fn stsd() -> Vec<u8> {
        let mut entry = vec![0u8; 6];
        entry.extend_from_slice(&1u16.to_be_bytes()); // data reference
        entry.extend_from_slice(&[0u8; 8]); // version, revision, vendor
        entry.extend_from_slice(&1u16.to_be_bytes()); // channels
        entry.extend_from_slice(&16u16.to_be_bytes()); // sample size
        entry.extend_from_slice(&[0u8; 4]);
        entry.extend_from_slice(&(RATE << 16).to_be_bytes());
        entry.extend_from_slice(&esds());

        let mut body = words(&[1]);
        body.extend_from_slice(&atom(b"mp4a", &entry));
        full_atom(b"stsd", &body)
    }

    fn moov(frames: u32, data_offset: u32) -> Vec<u8> {
        let duration = frames * 1024;

        let mut mvhd = words(&[0, 0, RATE, duration, 0x0001_0000]);
        mvhd.extend_from_slice(&0x0100u16.to_be_bytes());
        mvhd.resize(96, 0);

        let mut tkhd = words(&[0, 0, 1, 0, duration, 0, 0, 0]);
        tkhd.extend_from_slice(&0x0100u16.to_be_bytes());
        tkhd.resize(80, 0);

        let mut mdhd = words(&[0, 0, RATE, duration]);
        mdhd.extend_from_slice(&0x55c4u16.to_be_bytes()); // "und"
        mdhd.extend_from_slice(&[0, 0]);

        let mut hdlr = words(&[0]);
        hdlr.extend_from_slice(b"soun");
        hdlr.extend_from_slice(&[0u8; 12]);
        hdlr.extend_from_slice(b"SoundHandler\0");

        let stbl = [
            stsd(),
            full_atom(b"stts", &words(&[1, frames, 1024])),
            full_atom(b"stsc", &words(&[1, 1, frames, 1])),
            full_atom(b"stsz", &words(&[SILENT_FRAME.len() as u32, frames])),
            full_atom(b"stco", &words(&[1, data_offset])),
        ]
        .concat();

        let minf = atom(b"minf", &atom(b"stbl", &stbl));
        let mdia = atom(
            b"mdia",
            &[full_atom(b"mdhd", &mdhd), full_atom(b"hdlr", &hdlr), minf].concat(),
        );
        let trak = atom(b"trak", &[full_atom(b"tkhd", &tkhd), mdia].concat());
        atom(b"moov", &[full_atom(b"mvhd", &mvhd), trak].concat())
    }

    fn mdat(frames: u32) -> Vec<u8> {
        atom(b"mdat", &SILENT_FRAME.repeat(frames as usize))
    }

    /// ftyp, moov, mdat: playable from a forward-only stream.
    fn faststart_m4a(frames: u32) -> Vec<u8> {
        let head = ftyp().len() + moov(frames, 0).len();
        let data_offset = (head + 8) as u32;
        [ftyp(), moov(frames, data_offset), mdat(frames)].concat()
    }

    /// ftyp, mdat, moov: needs seeking to find the sample table.
    fn trailing_moov_m4a(frames: u32) -> Vec<u8> {
        let data_offset = (ftyp().len() + 8) as u32;
        [ftyp(), mdat(frames), moov(frames, data_offset)].concat()
    }

    #[test]
    fn test_m4a_plays_to_the_end() {
        let frames = 12;
        let output = MemoryOutput::new();
        let capture = output.handle();
        let mut player = player(AssetKind::M4a);

        let report = player
            .play(AssetStream::new(faststart_m4a(frames)), output)
            .unwrap();

        assert_eq!(report.exit, ExitReason::SinkFinished);
        assert_eq!(report.format_changes, vec![MusicInfo::new(RATE, 16, 1)]);
        assert_eq!(report.final_clock, ClockConfig::new(RATE, 16, 1));

        let pcm = capture.data();
        assert!(!pcm.is_empty());
        assert_eq!(pcm.len() % 2048, 0);
        assert!(pcm.len() <= frames as usize * 2048);
        assert!(pcm.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_m4a_without_leading_moov_fails_open() {
        let mut player = player(AssetKind::M4a);

        let report = player
            .play(AssetStream::new(trailing_moov_m4a(4)), MemoryOutput::new())
            .unwrap();

        assert_eq!(report.exit, ExitReason::SinkError(ElementErrorKind::Input));
        assert!(report.format_changes.is_empty());
    }
}

#[cfg(feature = "audio-mp3")]
mod mp3 {
    use super::*;

    // MPEG-1 layer III, 128 kbit/s, 44.1 kHz, stereo, no CRC.
    const HEADER: [u8; 4] = [0xff, 0xfb, 0x90, 0x00];
    const FRAME_LEN: usize = 417;

    /// Frames whose side information codes no spectral data.
    fn silent_mp3(frames: usize) -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..HEADER.len()].copy_from_slice(&HEADER);
        frame.repeat(frames)
    }

    #[test]
    fn test_mp3_plays_to_the_end() {
        let output = MemoryOutput::new();
        let capture = output.handle();
        let mut player = player(AssetKind::Mp3);

        let report = player
            .play(AssetStream::new(silent_mp3(8)), output)
            .unwrap();

        assert_eq!(report.exit, ExitReason::SinkFinished);
        assert_eq!(report.format_changes, vec![MusicInfo::cd()]);
        assert_eq!(report.final_clock, ClockConfig::new(44_100, 16, 2));

        let pcm = capture.data();
        // 1152 stereo frames per MP3 frame.
        assert!(pcm.len() >= 1152 * 4);
        assert_eq!(pcm.len() % 4, 0);
        assert!(pcm.iter().all(|&b| b == 0));
        assert_eq!(capture.clocks().last(), Some(&ClockConfig::new(44_100, 16, 2)));
    }
}
