//! C interface, layout compatible with `include/object_detection_2d_nanodet.h`.
//!
//! Every entry point records its outcome in a per-thread status that callers
//! read back with [`nanodet_last_error_code`] and [`nanodet_last_error_message`].
//! Panics are caught at this boundary.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_float, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use image::RgbImage;
use thiserror::Error;
use crate::common::{Detection, ModelConfig};
use crate::data::class_labels;
use crate::detection_runners::{FrameSettings, NanodetRunner};
use crate::error::NanodetError;

pub const NANODET_OK: c_int = 0;
pub const NANODET_ERR_INVALID_ARGUMENT: c_int = 5;
pub const NANODET_ERR_PANIC: c_int = 6;
pub const NANODET_ERR_IMAGE_IO: c_int = 7;

/// `nanodet_model_t`
#[repr(C)]
#[derive(Debug)]
pub struct NanodetModel {
    pub network: *mut c_void,
    pub device: *mut c_char,
    pub score_threshold: c_float,
    /// height, width
    pub input_size: [c_int; 2],
    pub keep_ratio: c_int,
}

impl NanodetModel {
    pub fn unloaded() -> Self {
        Self {
            network: ptr::null_mut(),
            device: ptr::null_mut(),
            score_threshold: 0.,
            input_size: [0, 0],
            keep_ratio: 0,
        }
    }

    unsafe fn runner(&self) -> Option<&NanodetRunner> {
        (self.network as *const NanodetRunner).as_ref()
    }

    fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            score_threshold: self.score_threshold,
            input_height: self.input_size[0].max(0) as u32,
            input_width: self.input_size[1].max(0) as u32,
            keep_ratio: self.keep_ratio != 0,
        }
    }
}

/// `opendr_image_t`, `data` owns an `RgbImage` created by [`load_image`].
#[repr(C)]
#[derive(Debug)]
pub struct OpendrImage {
    pub data: *mut c_void,
}

/// `opendr_detection_target_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OpendrDetectionTarget {
    pub name: c_int,
    pub left: c_float,
    pub top: c_float,
    pub width: c_float,
    pub height: c_float,
    pub score: c_float,
}

/// `opendr_detection_vector_target_t`
#[repr(C)]
#[derive(Debug)]
pub struct OpendrDetectionVectorTarget {
    pub starting_pointer: *mut OpendrDetectionTarget,
    pub size: c_int,
}

impl OpendrDetectionVectorTarget {
    pub fn empty() -> Self {
        Self {
            starting_pointer: ptr::null_mut(),
            size: 0,
        }
    }

    fn from_detections(detections: &[Detection]) -> Self {
        if detections.is_empty() {
            return Self::empty();
        }
        let targets: Box<[OpendrDetectionTarget]> = detections
            .iter()
            .map(|d| OpendrDetectionTarget {
                name: d.class_id as c_int,
                left: d.bbox.x1,
                top: d.bbox.y1,
                width: d.bbox.w,
                height: d.bbox.h,
                score: d.confidence,
            })
            .collect();
        let size = targets.len() as c_int;
        Self {
            starting_pointer: Box::into_raw(targets) as *mut OpendrDetectionTarget,
            size,
        }
    }

    unsafe fn as_slice(&self) -> Result<&[OpendrDetectionTarget], FfiError> {
        match (self.starting_pointer.is_null(), self.size) {
            (_, 0) => Ok(&[]),
            (false, n) if n > 0 => Ok(std::slice::from_raw_parts(self.starting_pointer, n as usize)),
            _ => Err(FfiError::InvalidArgument(format!(
                "detection vector has pointer {:?} and size {}",
                self.starting_pointer, self.size
            ))),
        }
    }
}

#[derive(Debug, Error)]
enum FfiError {
    #[error(transparent)]
    Nanodet(#[from] NanodetError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("image I/O failed: {0}")]
    ImageIo(String),
}

impl FfiError {
    fn code(&self) -> c_int {
        match self {
            FfiError::Nanodet(e) => e.code(),
            FfiError::InvalidArgument(_) => NANODET_ERR_INVALID_ARGUMENT,
            FfiError::ImageIo(_) => NANODET_ERR_IMAGE_IO,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<(c_int, Option<CString>)> = const { RefCell::new((NANODET_OK, None)) };
}

fn set_last_error(code: c_int, message: &str) {
    log::warn!("C API call failed with code {code}: {message}");
    let message = CString::new(message.replace('\0', " ")).ok();
    LAST_ERROR.with(|e| *e.borrow_mut() = (code, message));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = (NANODET_OK, None));
}

/// Runs `f`, records its outcome and returns `fallback` on failure.
fn guarded<T>(fallback: T, f: impl FnOnce() -> Result<T, FfiError>) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            clear_last_error();
            value
        }
        Ok(Err(e)) => {
            set_last_error(e.code(), &e.to_string());
            fallback
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            set_last_error(NANODET_ERR_PANIC, &format!("internal panic: {message}"));
            fallback
        }
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, FfiError> {
    if ptr.is_null() {
        return Err(FfiError::InvalidArgument(format!("{what} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| FfiError::InvalidArgument(format!("{what} is not valid UTF-8: {e}")))
}

unsafe fn image_mut<'a>(image: *mut OpendrImage) -> Option<&'a mut RgbImage> {
    image.as_ref().and_then(|image| (image.data as *mut RgbImage).as_mut())
}

/// Loads a model with `keep_ratio` enabled.
///
/// # Safety
/// `model_path` and `device` must be null or NUL-terminated strings, `model`
/// must be null or point to writable memory for a `nanodet_model_t`.
/// The struct is overwritten without being read, so a loaded model must be
/// released with [`free_nanodet_model`] before it is loaded again, or its
/// network and device leak.
#[no_mangle]
pub unsafe extern "C" fn load_nanodet_model(
    model_path: *mut c_char,
    device: *mut c_char,
    height: c_int,
    width: c_int,
    score_threshold: c_float,
    model: *mut NanodetModel,
) {
    load_nanodet_model_keep_ratio(model_path, device, height, width, score_threshold, 1, model)
}

/// Loads a model, letterboxing inputs when `keep_ratio` is non-zero.
///
/// # Safety
/// See [`load_nanodet_model`]. The same rule applies: free a loaded model
/// before loading into it again.
#[no_mangle]
pub unsafe extern "C" fn load_nanodet_model_keep_ratio(
    model_path: *mut c_char,
    device: *mut c_char,
    height: c_int,
    width: c_int,
    score_threshold: c_float,
    keep_ratio: c_int,
    model: *mut NanodetModel,
) {
    if model.is_null() {
        set_last_error(NANODET_ERR_INVALID_ARGUMENT, "model is null");
        return;
    }
    // the caller's struct may be uninitialized, never read it
    ptr::write(model, NanodetModel::unloaded());

    guarded((), || {
        let model_path = c_str(model_path, "model path")?;
        let device_name = c_str(device, "device")?;
        if height <= 0 || width <= 0 {
            return Err(NanodetError::ModelLoad(format!("input size must be positive, got {height}x{width}")).into());
        }

        let config = ModelConfig::new(model_path, device_name, height as u32, width as u32, score_threshold)
            .with_keep_ratio(keep_ratio != 0);
        let runner = NanodetRunner::load(&config)?;

        let device = CString::new(device_name).map_err(|e| FfiError::InvalidArgument(e.to_string()))?;
        ptr::write(model, NanodetModel {
            network: Box::into_raw(Box::new(runner)) as *mut c_void,
            device: device.into_raw(),
            score_threshold,
            input_size: [height, width],
            keep_ratio: (keep_ratio != 0) as c_int,
        });
        Ok(())
    })
}

/// Runs detection on `image`. The returned vector must be released with [`free_detections`].
///
/// # Safety
/// `model` must be null or a model written by a load call, `image` must be
/// null or an image created by [`load_image`].
#[no_mangle]
pub unsafe extern "C" fn infer_nanodet(model: *mut NanodetModel, image: *mut OpendrImage) -> OpendrDetectionVectorTarget {
    guarded(OpendrDetectionVectorTarget::empty(), || {
        let model = model
            .as_ref()
            .ok_or_else(|| FfiError::InvalidArgument("model is null".to_string()))?;
        let runner = model
            .runner()
            .ok_or_else(|| NanodetError::Usage("model is not loaded".to_string()))?;
        if image.is_null() {
            return Err(FfiError::InvalidArgument("image is null".to_string()));
        }
        let img = image_mut(image).ok_or_else(|| NanodetError::Inference("image holds no data".to_string()))?;

        let detections = runner.detect(img, &model.frame_settings())?;
        Ok(OpendrDetectionVectorTarget::from_detections(&detections))
    })
}

/// Releases the network and device string. Calling it again is a no-op.
///
/// # Safety
/// `model` must be null or a model written by a load call.
#[no_mangle]
pub unsafe extern "C" fn free_nanodet_model(model: *mut NanodetModel) {
    guarded((), || {
        let model = model
            .as_mut()
            .ok_or_else(|| FfiError::InvalidArgument("model is null".to_string()))?;
        if !model.network.is_null() {
            drop(Box::from_raw(model.network as *mut NanodetRunner));
            model.network = ptr::null_mut();
        }
        if !model.device.is_null() {
            drop(CString::from_raw(model.device));
            model.device = ptr::null_mut();
        }
        Ok(())
    })
}

/// Draws `detections` onto `image` in place.
///
/// # Safety
/// Pointers must be null or valid objects produced by this library.
#[no_mangle]
pub unsafe extern "C" fn draw_bboxes(
    image: *mut OpendrImage,
    model: *mut NanodetModel,
    detections: *mut OpendrDetectionVectorTarget,
) {
    guarded((), || {
        let runner = model
            .as_ref()
            .and_then(|m| m.runner())
            .ok_or_else(|| NanodetError::Visualization("model is not loaded".to_string()))?;
        let img = image_mut(image).ok_or_else(|| NanodetError::Visualization("image holds no data".to_string()))?;
        let targets = detections
            .as_ref()
            .ok_or_else(|| FfiError::InvalidArgument("detections is null".to_string()))?
            .as_slice()?;

        let detections: Vec<Detection> = targets
            .iter()
            .map(|t| {
                let class_id = t.name.max(0) as usize;
                Detection::default()
                    .with_x1y1_wh(t.left, t.top, t.width, t.height)
                    .with_class_id(class_id)
                    .with_label(&class_labels::label_for(runner.class_names(), class_id))
                    .with_confidence(t.score)
            })
            .collect();

        runner.draw(img, &detections)?;
        Ok(())
    })
}

/// Decodes the image file at `path` into `image`. On failure `image->data` is null.
///
/// # Safety
/// `path` must be null or a NUL-terminated string, `image` null or writable.
#[no_mangle]
pub unsafe extern "C" fn load_image(path: *const c_char, image: *mut OpendrImage) {
    if image.is_null() {
        set_last_error(NANODET_ERR_INVALID_ARGUMENT, "image is null");
        return;
    }
    ptr::write(image, OpendrImage { data: ptr::null_mut() });

    guarded((), || {
        let path = c_str(path, "image path")?;
        let img = image::open(path)
            .map_err(|e| FfiError::ImageIo(format!("{path}: {e}")))?
            .to_rgb8();
        (*image).data = Box::into_raw(Box::new(img)) as *mut c_void;
        Ok(())
    })
}

/// # Safety
/// `image` must be null or an image created by [`load_image`].
#[no_mangle]
pub unsafe extern "C" fn free_image(image: *mut OpendrImage) {
    guarded((), || {
        let image = image
            .as_mut()
            .ok_or_else(|| FfiError::InvalidArgument("image is null".to_string()))?;
        if !image.data.is_null() {
            drop(Box::from_raw(image.data as *mut RgbImage));
            image.data = ptr::null_mut();
        }
        Ok(())
    })
}

/// Writes `image` to `path`, format chosen by extension. Returns the status code.
///
/// # Safety
/// `path` must be null or a NUL-terminated string, `image` null or an image
/// created by [`load_image`].
#[no_mangle]
pub unsafe extern "C" fn save_image(path: *const c_char, image: *mut OpendrImage) -> c_int {
    guarded((), || {
        let path = c_str(path, "image path")?;
        let img = image_mut(image).ok_or_else(|| FfiError::InvalidArgument("image holds no data".to_string()))?;
        img.save(path).map_err(|e| FfiError::ImageIo(format!("{path}: {e}")))?;
        Ok(())
    });
    nanodet_last_error_code()
}

/// # Safety
/// `detections` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn initialize_detections(detections: *mut OpendrDetectionVectorTarget) {
    if detections.is_null() {
        set_last_error(NANODET_ERR_INVALID_ARGUMENT, "detections is null");
        return;
    }
    ptr::write(detections, OpendrDetectionVectorTarget::empty());
    clear_last_error();
}

/// Releases a vector returned by [`infer_nanodet`] and resets it to empty.
///
/// # Safety
/// `detections` must be null, empty, or a vector returned by [`infer_nanodet`].
#[no_mangle]
pub unsafe extern "C" fn free_detections(detections: *mut OpendrDetectionVectorTarget) {
    guarded((), || {
        let detections = detections
            .as_mut()
            .ok_or_else(|| FfiError::InvalidArgument("detections is null".to_string()))?;
        if !detections.starting_pointer.is_null() && detections.size > 0 {
            let slice = ptr::slice_from_raw_parts_mut(detections.starting_pointer, detections.size as usize);
            drop(Box::from_raw(slice));
        }
        *detections = OpendrDetectionVectorTarget::empty();
        Ok(())
    })
}

/// Status of the last call made on this thread, 0 on success.
#[no_mangle]
pub extern "C" fn nanodet_last_error_code() -> c_int {
    LAST_ERROR.with(|e| e.borrow().0)
}

/// Message of the last failed call on this thread, or null.
///
/// The pointer stays valid until the next library call on the same thread.
#[no_mangle]
pub extern "C" fn nanodet_last_error_message() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().1.as_ref().map_or(ptr::null(), |m| m.as_ptr()))
}

/// Installs `env_logger`, honouring `RUST_LOG`. Later calls do nothing.
#[no_mangle]
pub extern "C" fn nanodet_init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
