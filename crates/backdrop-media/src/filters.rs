//! Morphology and Gaussian blur over 8-bit images.
//!
//! Backed by OpenCV when the `opencv` feature is enabled, imageproc otherwise.

use image::{ImageBuffer, Pixel};

use crate::error::MediaResult;

/// An 8-bit image with any channel count.
pub type Image8<P> = ImageBuffer<P, Vec<u8>>;

/// Sigma OpenCV derives for a `ksize` x `ksize` kernel when given 0.
pub fn default_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Morphological close followed by open with a square `kernel_size` element.
pub fn close_open(mask: &image::GrayImage, kernel_size: u32) -> MediaResult<image::GrayImage> {
    if kernel_size <= 1 || mask.width() == 0 || mask.height() == 0 {
        return Ok(mask.clone());
    }
    backend::close_open(mask, kernel_size)
}

/// Gaussian blur with a `ksize` x `ksize` kernel and OpenCV's default sigma.
///
/// `ksize` is forced odd; 1 or less returns the input unchanged.
pub fn gaussian_blur<P>(image: &Image8<P>, ksize: u32) -> MediaResult<Image8<P>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if ksize <= 1 || image.width() == 0 || image.height() == 0 {
        return Ok(image.clone());
    }
    backend::gaussian_blur(image, ksize | 1)
}

#[cfg(feature = "opencv")]
pub(crate) mod backend {
    use image::{GrayImage, ImageBuffer, Pixel};
    use opencv::{
        core::{self, Mat, Point, Scalar, Size},
        imgproc,
        prelude::*,
    };

    use super::Image8;
    use crate::error::{MediaError, MediaResult};

    pub(crate) fn cv_err(op: &'static str) -> impl Fn(opencv::Error) -> MediaError {
        move |e| MediaError::processing(format!("{}: {}", op, e))
    }

    /// Copy an image into a freshly allocated, continuous Mat.
    pub(crate) fn to_mat<P>(image: &Image8<P>) -> MediaResult<Mat>
    where
        P: Pixel<Subpixel = u8>,
    {
        let typ = match P::CHANNEL_COUNT {
            1 => core::CV_8UC1,
            3 => core::CV_8UC3,
            4 => core::CV_8UC4,
            n => return Err(MediaError::processing(format!("Unsupported channel count {}", n))),
        };
        let (w, h) = image.dimensions();
        let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, typ, Scalar::all(0.0))
            .map_err(cv_err("Allocate"))?;
        mat.data_bytes_mut()
            .map_err(cv_err("Copy into Mat"))?
            .copy_from_slice(image.as_raw());
        Ok(mat)
    }

    pub(crate) fn from_mat<P>(mat: &Mat) -> MediaResult<Image8<P>>
    where
        P: Pixel<Subpixel = u8>,
    {
        let data = mat.data_bytes().map_err(cv_err("Copy out of Mat"))?.to_vec();
        ImageBuffer::from_raw(mat.cols() as u32, mat.rows() as u32, data)
            .ok_or_else(|| MediaError::processing("Mat layout does not match image"))
    }

    pub fn close_open(mask: &GrayImage, kernel_size: u32) -> MediaResult<GrayImage> {
        let k = kernel_size as i32;
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(k, k),
            Point::new(-1, -1),
        )
        .map_err(cv_err("Structuring element"))?;

        let src = to_mat(mask)?;
        let mut closed = Mat::default();
        imgproc::morphology_ex_def(&src, &mut closed, imgproc::MORPH_CLOSE, &kernel)
            .map_err(cv_err("Close"))?;
        let mut opened = Mat::default();
        imgproc::morphology_ex_def(&closed, &mut opened, imgproc::MORPH_OPEN, &kernel)
            .map_err(cv_err("Open"))?;
        from_mat(&opened)
    }

    pub fn gaussian_blur<P>(image: &Image8<P>, ksize: u32) -> MediaResult<Image8<P>>
    where
        P: Pixel<Subpixel = u8>,
    {
        let k = ksize as i32;
        let src = to_mat(image)?;
        let mut dst = Mat::default();
        imgproc::gaussian_blur_def(&src, &mut dst, Size::new(k, k), 0.0)
            .map_err(cv_err("Gaussian blur"))?;
        from_mat(&dst)
    }
}

#[cfg(not(feature = "opencv"))]
pub(crate) mod backend {
    use image::{GrayImage, Pixel};
    use imageproc::distance_transform::Norm;

    use super::{default_sigma, Image8};
    use crate::error::MediaResult;

    pub fn close_open(mask: &GrayImage, kernel_size: u32) -> MediaResult<GrayImage> {
        // LInf radius r is a (2r + 1) square
        let radius = (kernel_size / 2).min(u8::MAX as u32) as u8;
        let closed = imageproc::morphology::close(mask, Norm::LInf, radius);
        Ok(imageproc::morphology::open(&closed, Norm::LInf, radius))
    }

    pub fn gaussian_blur<P>(image: &Image8<P>, ksize: u32) -> MediaResult<Image8<P>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        Ok(imageproc::filter::gaussian_blur_f32(image, default_sigma(ksize)))
    }
}
