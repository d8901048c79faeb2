//! Per-pixel channel derivation, one strategy per shader pack
//!
//! All derivations operate whole-image: an intermediate buffer is fully
//! rewritten before later stages read it again. The color-table lookup maps
//! a packed alpha value to two adjacent table rows and a fractional blend
//! weight; see [`colorset_indices`].

use image::{Rgba, RgbaImage};
use marionette_formats::{ColorChannel, ColorTable, MaterialContainer, TextureUsage};

use super::{MaterialConstants, ShaderPack, TextureError, TextureResult, TextureSet};
use crate::scene::AlphaMode;

/// Derive the shader pack's implied channels in place and return the
/// constant material flags
pub fn derive(
    pack: &ShaderPack,
    material: &MaterialContainer,
    set: &mut TextureSet,
) -> TextureResult<MaterialConstants> {
    match pack {
        ShaderPack::Character => derive_character(material, set),
        ShaderPack::Skin => derive_skin(set),
        ShaderPack::Hair => derive_hair(material, set),
        ShaderPack::Iris => derive_iris(material, set),
        ShaderPack::Unknown(name) => {
            tracing::debug!(shader_pack = %name, "Unhandled shader pack, passing textures through");
            Ok(MaterialConstants::default())
        }
    }
}

/// Map a packed alpha value onto two adjacent color-table row indices and
/// the fractional blend between them
pub fn colorset_indices(alpha: u8) -> (usize, usize, f64) {
    let row = alpha as usize / 17;
    let idx1 = row * 16;
    let idx2 = if row >= 15 { 15 } else { row + 1 } * 16;
    let blend = (alpha as usize % 17) as f64 / 17.0;
    (idx1, idx2, blend)
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend two color-table rows for a channel, carrying the given alpha
fn blend_pixel(
    table: &ColorTable,
    idx1: usize,
    idx2: usize,
    alpha: u8,
    blend: f64,
    channel: ColorChannel,
) -> Rgba<u8> {
    let rgb = table.blend(idx1, idx2, blend, channel);
    Rgba([to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), alpha])
}

/// `(green / 255)^2`, the mask attenuation factor
fn green_attenuation(green: u8) -> f64 {
    let g = green as f64 / 255.0;
    g * g
}

fn scale_channel(value: u8, factor: f64) -> u8 {
    (value as f64 * factor).round().clamp(0.0, 255.0) as u8
}

/// Nearest-neighbor sample with precomputed axis factors, clamped to bounds
fn sample_nn(img: &RgbaImage, x: u32, y: u32, fx: f32, fy: f32) -> Rgba<u8> {
    let sx = ((x as f32 * fx) as u32).min(img.width().saturating_sub(1));
    let sy = ((y as f32 * fy) as u32).min(img.height().saturating_sub(1));
    *img.get_pixel(sx, sy)
}

/// Copy the normal map's blue channel into the diffuse image's alpha
/// channel, nearest-neighbor-scaled when dimensions differ
pub fn copy_blue_to_alpha(normal: &RgbaImage, diffuse: &mut RgbaImage) {
    let fx = normal.width() as f32 / diffuse.width() as f32;
    let fy = normal.height() as f32 / diffuse.height() as f32;

    for y in 0..diffuse.height() {
        for x in 0..diffuse.width() {
            let np = sample_nn(normal, x, y, fx, fy);
            let dp = diffuse.get_pixel_mut(x, y);
            dp.0[3] = np.0[2];
        }
    }
}

fn table_of(material: &MaterialContainer) -> ColorTable {
    material
        .color_table
        .clone()
        .unwrap_or_else(ColorTable::neutral)
}

/// Character gear: split the normal map into diffuse, specular and emissive
/// via the color table, then derive occlusion from mask + specular
fn derive_character(
    material: &MaterialContainer,
    set: &mut TextureSet,
) -> TextureResult<MaterialConstants> {
    let complete = set.contains_key(&TextureUsage::Diffuse)
        && set.contains_key(&TextureUsage::Specular)
        && set.contains_key(&TextureUsage::Reflection);

    if let Some(normal) = set.get(&TextureUsage::Normal).cloned() {
        if !complete {
            let table = table_of(material);
            let (w, h) = normal.dimensions();
            let mut normal = normal;

            // An existing diffuse keeps its colors but takes the normal's
            // packed opacity as alpha
            let mut init_diffuse = set.get(&TextureUsage::Diffuse).cloned();
            if let Some(d) = init_diffuse.as_mut() {
                copy_blue_to_alpha(&normal, d);
            }

            let mut diffuse = RgbaImage::new(w, h);
            let mut specular = RgbaImage::new(w, h);
            let mut emission = RgbaImage::new(w, h);

            for y in 0..h {
                for x in 0..w {
                    let np = *normal.get_pixel(x, y);
                    let (idx1, idx2, blend) = colorset_indices(np.0[3]);

                    // Unpack the opacity-in-blue encoding back into a
                    // standard normal map
                    normal.put_pixel(x, y, Rgba([np.0[0], np.0[1], 255, np.0[2]]));

                    diffuse.put_pixel(
                        x,
                        y,
                        blend_pixel(&table, idx1, idx2, np.0[2], blend, ColorChannel::Diffuse),
                    );
                    specular.put_pixel(
                        x,
                        y,
                        blend_pixel(&table, idx1, idx2, 255, blend, ColorChannel::Specular),
                    );
                    emission.put_pixel(
                        x,
                        y,
                        blend_pixel(&table, idx1, idx2, 255, blend, ColorChannel::Emissive),
                    );
                }
            }

            set.insert(TextureUsage::Normal, normal);
            match init_diffuse {
                Some(existing) => {
                    set.insert(TextureUsage::Diffuse, existing);
                }
                None => {
                    set.insert(TextureUsage::Diffuse, diffuse);
                }
            }
            set.entry(TextureUsage::Specular).or_insert(specular);
            set.entry(TextureUsage::Reflection).or_insert(emission);
        }
    }

    if let (Some(mask), Some(spec)) = (
        set.get(&TextureUsage::Mask).cloned(),
        set.get(&TextureUsage::Specular).cloned(),
    ) {
        let (mw, mh) = mask.dimensions();
        let mut spec = spec;
        let mut occlusion = RgbaImage::new(mw, mh);

        for y in 0..mh {
            for x in 0..mw {
                let mp = *mask.get_pixel(x, y);
                let factor = green_attenuation(mp.0[1]);

                if x < spec.width() && y < spec.height() {
                    let sp = *spec.get_pixel(x, y);
                    spec.put_pixel(
                        x,
                        y,
                        Rgba([
                            scale_channel(sp.0[0], factor),
                            scale_channel(sp.0[1], factor),
                            scale_channel(sp.0[2], factor),
                            sp.0[3],
                        ]),
                    );
                }

                // Occlusion is greyscale from the mask's red channel
                occlusion.put_pixel(x, y, Rgba([mp.0[0], mp.0[0], mp.0[0], 255]));
            }
        }

        set.insert(TextureUsage::Specular, spec);
        set.insert(TextureUsage::WaveMap, occlusion);
    }

    Ok(MaterialConstants::default())
}

/// Skin: move the packed opacity from the normal's blue channel into the
/// diffuse alpha, then restore the normal to a standard encoding
fn derive_skin(set: &mut TextureSet) -> TextureResult<MaterialConstants> {
    let constants = MaterialConstants {
        alpha_mode: AlphaMode::Mask,
        backface_culling: true,
    };

    let Some(normal) = set.get(&TextureUsage::Normal).cloned() else {
        return Ok(constants);
    };
    let Some(mut diffuse) = set.get(&TextureUsage::Diffuse).cloned() else {
        return Err(TextureError::MissingInput(
            "skin material without a diffuse texture".to_string(),
        ));
    };

    copy_blue_to_alpha(&normal, &mut diffuse);

    let mut normal = normal;
    for pixel in normal.pixels_mut() {
        let np = *pixel;
        *pixel = Rgba([np.0[0], np.0[1], 255, np.0[2]]);
    }

    set.insert(TextureUsage::Normal, normal);
    set.insert(TextureUsage::Diffuse, diffuse);

    Ok(constants)
}

/// Hair: specular from the color table keyed on normal alpha; when a mask
/// exists, a provisional diffuse plus a specular-tinted mask recolor
fn derive_hair(
    material: &MaterialContainer,
    set: &mut TextureSet,
) -> TextureResult<MaterialConstants> {
    let constants = MaterialConstants {
        alpha_mode: AlphaMode::Mask,
        backface_culling: false,
    };

    let Some(normal) = set.get(&TextureUsage::Normal).cloned() else {
        return Ok(constants);
    };

    let table = table_of(material);
    let (w, h) = normal.dimensions();
    let mut specular = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let np = *normal.get_pixel(x, y);
            let (idx1, idx2, blend) = colorset_indices(np.0[3]);
            // Keep the normal's per-pixel alpha for opacity
            specular.put_pixel(
                x,
                y,
                blend_pixel(&table, idx1, idx2, np.0[3], blend, ColorChannel::Specular),
            );
        }
    }
    set.insert(TextureUsage::Specular, specular.clone());

    if let Some(mask) = set.get(&TextureUsage::Mask).cloned() {
        let (dw, dh) = mask.dimensions();
        let sfx = specular.width() as f32 / dw as f32;
        let sfy = specular.height() as f32 / dh as f32;
        let nfx = normal.width() as f32 / dw as f32;
        let nfy = normal.height() as f32 / dh as f32;

        let mut recolored = RgbaImage::new(dw, dh);
        let mut diffuse = RgbaImage::new(dw, dh);

        for y in 0..dh {
            for x in 0..dw {
                let mp = *mask.get_pixel(x, y);
                let sp = sample_nn(&specular, x, y, sfx, sfy);
                let np = sample_nn(&normal, x, y, nfx, nfy);
                let factor = green_attenuation(mp.0[1]);

                recolored.put_pixel(
                    x,
                    y,
                    Rgba([
                        scale_channel(sp.0[0], factor),
                        scale_channel(sp.0[1], factor),
                        scale_channel(sp.0[2], factor),
                        np.0[3],
                    ]),
                );

                // TODO: blend the diffuse against the mask colours instead
                // of flat white
                diffuse.put_pixel(x, y, Rgba([255, 255, 255, np.0[3]]));
            }
        }

        set.insert(TextureUsage::Mask, recolored);
        set.insert(TextureUsage::Diffuse, diffuse);
    }

    Ok(constants)
}

/// Iris: specular from the color table keyed on normal alpha, fully opaque
fn derive_iris(
    material: &MaterialContainer,
    set: &mut TextureSet,
) -> TextureResult<MaterialConstants> {
    if let Some(normal) = set.get(&TextureUsage::Normal) {
        let table = table_of(material);
        let (w, h) = normal.dimensions();
        let mut specular = RgbaImage::new(w, h);

        for y in 0..h {
            for x in 0..w {
                let np = *normal.get_pixel(x, y);
                let (idx1, idx2, blend) = colorset_indices(np.0[3]);
                specular.put_pixel(
                    x,
                    y,
                    blend_pixel(&table, idx1, idx2, 255, blend, ColorChannel::Specular),
                );
            }
        }

        set.insert(TextureUsage::Specular, specular);
    }

    Ok(MaterialConstants::default())
}
