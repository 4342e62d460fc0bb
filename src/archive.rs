//! 特徴マップを tar.gz アーカイブから読み書きするモジュール
//!
//! アーカイブには `feature0`, `feature1`, ... というエントリがスケール順に入っており、
//! それぞれ (channel, row, column) 順に詰めたリトルエンディアンの `f32` です。

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};

use crate::config::Config;
use crate::error::{PostProcessError, Result};
use crate::tensor::TensorData;

const ENTRY_PREFIX: &str = "feature";

/// エントリ名からスケールのインデックスを取り出す (拡張子は無視)
fn entry_scale(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(ENTRY_PREFIX)?
        .parse()
        .ok()
}

/// 特徴マップを読み込みます。
///
/// # Args
/// * `path` - tar.gz アーカイブへのパス
/// * `config` - 各スケールの形状を決める設定
///
/// # Return
/// * スケール順の特徴マップ
pub fn read_feature_maps<P: AsRef<Path>>(path: P, config: &Config) -> Result<Vec<TensorData>> {
    info!("reading feature maps: {}", path.as_ref().display());
    let file = File::open(path)?;
    read_feature_maps_from(file, config)
}

/// 任意のリーダから tar.gz 形式の特徴マップを読み込みます。
///
/// # 注意
/// * ファイル名が `feature<N>` 以外のエントリは警告をログに出力して無視します。
/// * バイト数が期待される形状と一致しない場合は、エントリを読み込まずに `ShapeMismatch` を返します。
/// * 同じスケールのエントリが複数ある場合は `Archive` エラーを返します。
pub fn read_feature_maps_from<R: Read>(reader: R, config: &Config) -> Result<Vec<TensorData>> {
    let num_scales = config.grid_sizes.len();
    let mut maps: Vec<Option<TensorData>> = vec![None; num_scales];
    let mut seen = vec![false; num_scales];

    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        let scale = match entry_scale(&path) {
            Some(s) if s < num_scales => s,
            _ => {
                warn!("skipping unknown entry: {}", path.display());
                continue;
            }
        };

        if seen[scale] {
            return Err(PostProcessError::Archive(format!(
                "duplicate entry for scale {}: {}",
                scale,
                path.display()
            )));
        }
        seen[scale] = true;

        // 読み込む前にヘッダのサイズで検証する
        let shape = [config.expected_channels(), config.grid_sizes[scale], config.grid_sizes[scale]];
        let expected_bytes = shape.iter().product::<usize>() * 4;
        let size = entry.header().size()?;
        if size != expected_bytes as u64 {
            return Err(PostProcessError::ShapeMismatch {
                scale,
                expected: shape,
                actual: [(size / 4) as usize, 1, 1],
            });
        }

        let mut buf = Vec::with_capacity(expected_bytes);
        entry.read_to_end(&mut buf)?;
        if buf.len() != expected_bytes {
            return Err(PostProcessError::Archive(format!(
                "truncated entry {}: {} of {} bytes",
                path.display(),
                buf.len(),
                expected_bytes
            )));
        }

        let data = buf
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        maps[scale] = Some(TensorData::contiguous(data, shape));
    }

    maps.into_iter()
        .enumerate()
        .map(|(scale, m)| {
            m.ok_or_else(|| {
                PostProcessError::Archive(format!("missing entry {}{}", ENTRY_PREFIX, scale))
            })
        })
        .collect()
}

/// 特徴マップを tar.gz アーカイブへ書き出します。
///
/// ストライドに関わらず、(channel, row, column) 順に詰めて保存します。
pub fn write_feature_maps<P: AsRef<Path>>(path: P, maps: &[TensorData]) -> Result<()> {
    let file = File::create(path)?;
    write_feature_maps_to(file, maps)?;
    Ok(())
}

/// 任意のライタへ tar.gz 形式で特徴マップを書き出します。
pub fn write_feature_maps_to<W: Write>(writer: W, maps: &[TensorData]) -> Result<W> {
    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));

    for (scale, map) in maps.iter().enumerate() {
        let view = map.view()?;
        let [channels, rows, cols] = view.shape();
        let mut bytes = Vec::with_capacity(channels * rows * cols * 4);
        for c in 0..channels {
            for y in 0..rows {
                for x in 0..cols {
                    bytes.extend_from_slice(&view.get(c, y, x)?.to_le_bytes());
                }
            }
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{}{}", ENTRY_PREFIX, scale), bytes.as_slice())?;
    }

    let writer = builder.into_inner()?.finish()?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names() {
        assert_eq!(entry_scale(Path::new("feature0")), Some(0));
        assert_eq!(entry_scale(Path::new("dump/feature2.bin")), Some(2));
        assert_eq!(entry_scale(Path::new("weights0")), None);
        assert_eq!(entry_scale(Path::new("featureX")), None);
    }

    #[test]
    fn missing_scale_is_an_error() {
        let config = Config::default();
        let maps = vec![
            TensorData::zeros([24, 13, 13]),
            TensorData::zeros([24, 26, 26]),
        ];
        let buf = write_feature_maps_to(Vec::new(), &maps).unwrap();
        match read_feature_maps_from(buf.as_slice(), &config) {
            Err(PostProcessError::Archive(msg)) => assert!(msg.contains("feature2")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn wrong_size_entry_is_a_shape_mismatch() {
        let config = Config::default();
        let maps = vec![
            TensorData::zeros([24, 13, 13]),
            TensorData::zeros([24, 13, 13]),
            TensorData::zeros([24, 52, 52]),
        ];
        let buf = write_feature_maps_to(Vec::new(), &maps).unwrap();
        match read_feature_maps_from(buf.as_slice(), &config) {
            Err(PostProcessError::ShapeMismatch { scale, .. }) => assert_eq!(scale, 1),
            other => panic!("unexpected: {:?}", other),
        }
    }

    fn gzip_tar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_slice()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn duplicate_scale_is_an_error() {
        let config = Config::default();
        let bytes = |g: usize| vec![0u8; 24 * g * g * 4];
        let buf = gzip_tar(&[
            ("feature0", bytes(13)),
            ("feature1", bytes(26)),
            ("out/feature0.bin", bytes(13)),
            ("feature2", bytes(52)),
        ]);
        match read_feature_maps_from(buf.as_slice(), &config) {
            Err(PostProcessError::Archive(msg)) => assert!(msg.contains("out/feature0.bin")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn oversized_entry_is_rejected_from_its_header() {
        let config = Config::default();
        // 大きなエントリは読み込まずにヘッダのサイズで弾く
        let huge = vec![0u8; 8 << 20];
        let buf = gzip_tar(&[("feature0", huge)]);
        match read_feature_maps_from(buf.as_slice(), &config) {
            Err(PostProcessError::ShapeMismatch { scale, expected, actual }) => {
                assert_eq!(scale, 0);
                assert_eq!(expected, [24, 13, 13]);
                assert_eq!(actual, [2 << 20, 1, 1]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
