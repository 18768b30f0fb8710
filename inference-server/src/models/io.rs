use {
    anyhow::{Result, bail},
    image::{DynamicImage, imageops::FilterType, GenericImageView},
};

pub const RESIZE_TO: u32 = 256;
pub const CROP_SIZE: u32 = 224;

pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Dense f32 tensor in channels-first layout.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl InputTensor {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            bail!("tensor of shape {:?} needs {} values, got {}", shape, expected, data.len());
        }

        Ok(Self {
            shape,
            data,
        })
    }

    pub fn filled(shape: [usize; 3], value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[(channel * self.height() + y) * self.width() + x]
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        bail!("empty image");
    }

    Ok(image::load_from_memory(bytes)?)
}

/// Centre-crop the region that a shorter-side resize to 256 followed by a
/// 224x224 crop would keep, resize it to 224x224, scale to [0, 1] and
/// normalize per channel.
pub fn preprocess(bytes: &[u8]) -> Result<InputTensor> {
    image_to_tensor(&decode_image(bytes)?)
}

pub fn image_to_tensor(image: &DynamicImage) -> Result<InputTensor> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        bail!("image has no pixels ({}x{})", width, height);
    }

    // crop in source coordinates, the resize only ever sees the kept square
    let side = crop_side(width.min(height))?;
    let left = (width - side) / 2;
    let top = (height - side) / 2;
    let cropped = image
        .crop_imm(left, top, side, side)
        .resize_exact(CROP_SIZE, CROP_SIZE, FilterType::Triangle)
        .to_rgb8();

    let size = CROP_SIZE as usize;
    let mut data = vec![0.0; 3 * size * size];
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            data[(channel * size + y as usize) * size + x as usize] = (value - NORMALIZE_MEAN[channel]) / NORMALIZE_STD[channel];
        }
    }

    Ok(InputTensor {
        shape: [3, size, size],
        data,
    })
}

fn crop_side(shorter_side: u32) -> Result<u32> {
    let side = (u64::from(shorter_side) * u64::from(CROP_SIZE) / u64::from(RESIZE_TO)).max(1);
    Ok(u32::try_from(side)?)
}
