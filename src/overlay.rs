//! 検出結果を表示面へ重ねるための画像処理モジュール
//!
//! 後処理の出力は入力キャンバス (416x416) の座標系なので、
//! 表示面への変換はここで行います。

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;
use log::debug;
use rusttype::{Font, Scale};

use crate::config::Config;
use crate::detection_result::Detection;
use crate::geometry::Rect;

/// クラスIDとラベル・色の対応
#[derive(Debug, Clone)]
pub struct LabelMap {
    labels: Vec<String>,
    colors: Vec<Rgb<u8>>,
}

impl Default for LabelMap {
    /// 赤、緑、黄の3クラス
    fn default() -> Self {
        Self::new(
            vec!["0".into(), "1".into(), "2".into()],
            vec![Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([255, 255, 0])],
        )
    }
}

impl LabelMap {
    pub fn new(labels: Vec<String>, colors: Vec<Rgb<u8>>) -> Self {
        Self { labels, colors }
    }

    /// ラベル名。未登録のクラスはIDをそのまま使う
    pub fn label(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| class.to_string())
    }

    /// 色。未登録のクラスは登録済みの色を順に使い回す
    pub fn color(&self, class: usize) -> Rgb<u8> {
        if self.colors.is_empty() {
            Rgb([255, 255, 255])
        } else {
            self.colors[class % self.colors.len()]
        }
    }

    /// 表示用のテキスト (`"<ラベル> <スコア百分率>"`)
    pub fn text(&self, d: &Detection) -> String {
        format!("{} {:.3}", self.label(d.class), d.score * 100.)
    }
}

/// 入力キャンバスから表示面への座標変換
///
/// 表示面の幅に合わせて正方形に拡大し、縦方向は中央に配置します。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub top: f32,
}

impl DisplayTransform {
    /// # Args
    /// * `display_width`, `display_height` - 表示面のサイズ
    /// * `config` - 入力キャンバスのサイズを持つ設定
    pub fn fit_width(display_width: f32, display_height: f32, config: &Config) -> Self {
        let width = display_width;
        let height = width;
        Self {
            scale_x: width / config.input_width as f32,
            scale_y: height / config.input_height as f32,
            top: (display_height - height) / 2.,
        }
    }

    pub fn apply(&self, r: &Rect) -> Rect {
        let mut out = r.scaled(self.scale_x, self.scale_y);
        out.y += self.top;
        out
    }
}

fn is_finite_rect(r: &Rect) -> bool {
    [r.x, r.y, r.width, r.height].iter().all(|v| v.is_finite())
}

/// 画像の範囲に切り詰めて矩形を塗りつぶします。
///
/// # Args
/// * `img` - 描画する画像 (in-place)
/// * `x0`, `y0` - 左上 (含む)
/// * `x1`, `y1` - 右下 (含まない)
/// * `color` - 塗りつぶす色
///
/// 座標が有限でない場合や、画像と重ならない場合は何もしません。
fn fill_clipped(img: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb<u8>) {
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return;
    }
    let left = x0.min(x1).round().max(0.);
    let top = y0.min(y1).round().max(0.);
    let right = x0.max(x1).round().min(img.width() as f32);
    let bottom = y0.max(y1).round().min(img.height() as f32);
    if right - left < 1. || bottom - top < 1. {
        return;
    }

    let rect = PixelRect::at(left as i32, top as i32)
        .of_size((right - left) as u32, (bottom - top) as u32);
    draw_filled_rect_mut(img, rect, color);
}

/// 画像上に矩形の枠を描画します。枠線は矩形の辺を中心に `thickness` の幅を持ちます。
fn draw_frame(img: &mut RgbImage, r: &Rect, thickness: f32, color: Rgb<u8>) {
    let half = (thickness / 2.).floor();
    let (left, top) = (r.x.round() - half, r.y.round() - half);
    let (right, bottom) = (r.max_x().round() - half, r.max_y().round() - half);

    fill_clipped(img, left, top, right + thickness, top + thickness, color);
    fill_clipped(img, left, bottom, right + thickness, bottom + thickness, color);
    fill_clipped(img, left, top, left + thickness, bottom + thickness, color);
    fill_clipped(img, right, top, right + thickness, bottom + thickness, color);
}

/// 背景色に対して読みやすい文字色 (暗ければ白、明るければ黒)
fn text_color_on(bg: Rgb<u8>) -> Rgb<u8> {
    let sum: u32 = bg.0.iter().map(|&c| u32::from(c)).sum();
    if sum < 382 {
        Rgb([255, 255, 255])
    } else {
        Rgb([0, 0, 0])
    }
}

/// 枠の左上に接するようにラベルを描画します。
///
/// # Args
/// * `img` - 描画する画像 (in-place)
/// * `x`, `y` - ラベルの左下の座標
/// * `bg_color` - ラベルの背景色
/// * `font` - ラベルのフォント
/// * `font_size` - ラベルの高さ
/// * `text` - ラベルに表示するテキスト
fn draw_label(
    img: &mut RgbImage,
    (x, y): (f32, f32),
    bg_color: Rgb<u8>,
    font: &Font,
    font_size: f32,
    text: &str,
) {
    let pad = 6.;
    let scale = Scale::uniform(font_size);
    let (text_w, _) = text_size(scale, font, text);
    let label_w = text_w as f32 + pad * 2.;
    let top = y - font_size;

    // 画像と重ならないラベルは描かない
    if x + label_w <= 0. || x >= img.width() as f32 || y <= 0. || top >= img.height() as f32 {
        return;
    }
    fill_clipped(img, x, top, x + label_w, y, bg_color);

    let v_metrics = font.v_metrics(scale);
    let text_h = v_metrics.ascent - v_metrics.descent + v_metrics.line_gap;
    let text_y = top + (font_size - text_h) / 2.;
    draw_text_mut(
        img,
        text_color_on(bg_color),
        (x + pad) as i32,
        text_y as i32,
        scale,
        font,
        text,
    );
}

/// 画像上にバウンディングボックスとラベルを描画します。
///
/// # Args
///
/// * `img` - 描画する画像 (in-place)
/// * `detections` - 検出結果
/// * `transform` - 入力キャンバスから画像への座標変換
/// * `labels` - クラスとラベル・色の対応
/// * `font` - ラベルのフォント。`None` なら枠だけを描く
/// * `font_size` - ラベルのフォントサイズ
/// * `line_thickness` - 枠線の太さ
///
/// 座標やサイズが有限でない検出結果は描画しません。
#[allow(clippy::too_many_arguments)]
pub fn draw_bbox(
    img: &mut RgbImage,
    detections: &[Detection],
    transform: &DisplayTransform,
    labels: &LabelMap,
    font: Option<&Font>,
    font_size: f32,
    line_thickness: f32,
) {
    // スコアの高いものを上に描くため、低い順に描画
    for d in detections.iter().rev() {
        let r = transform.apply(&d.rect);
        if !is_finite_rect(&r) {
            debug!("skipping non-finite box: {}", d);
            continue;
        }
        let color = labels.color(d.class);
        draw_frame(img, &r, line_thickness, color);

        if let Some(font) = font {
            let half = (line_thickness / 2.).floor();
            let anchor = (r.x.round() - half, r.y.round() - half);
            draw_label(img, anchor, color, font, font_size, &labels.text(d));
        }
    }
}
