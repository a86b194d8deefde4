use log::debug;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::path::Path;

use super::source::{Frame, FrameSource, VideoInfo};
use crate::error::{AnnotationError, Result};

fn media_err(e: opencv::Error) -> AnnotationError {
    AnnotationError::Media(e.to_string())
}

/// OpenCVを使用した動画ファイルのデコード
#[derive(Default)]
pub struct OpenCvSource {
    capture: Option<VideoCapture>,
}

impl OpenCvSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for OpenCvSource {
    fn open(&mut self, path: &Path) -> Result<VideoInfo> {
        self.release();
        if !path.is_file() {
            return Err(AnnotationError::MissingFile(path.to_path_buf()));
        }
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, VideoCaptureAPIs::CAP_ANY as i32)
            .map_err(media_err)?;
        if !capture.is_opened().map_err(media_err)? {
            return Err(AnnotationError::Media(format!(
                "cannot open video {}",
                path.display()
            )));
        }

        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT).map_err(media_err)? as usize;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(media_err)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(media_err)? as u32;
        let fps = capture.get(videoio::CAP_PROP_FPS).map_err(media_err)?;
        debug!(
            "Opened {}: {} frames, {}x{} @ {} fps",
            path.display(),
            frame_count,
            width,
            height,
            fps
        );

        self.capture = Some(capture);
        Ok(VideoInfo::new(frame_count, fps, width, height))
    }

    /// シークしてから1フレーム読む (BGR → RGB)
    fn read_frame(&mut self, index: usize) -> Result<Frame> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| AnnotationError::Media("no video opened".to_string()))?;
        capture
            .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
            .map_err(media_err)?;

        let mut bgr = Mat::default();
        let ok = capture.read(&mut bgr).map_err(media_err)?;
        if !ok || bgr.empty() {
            return Err(AnnotationError::Media(format!(
                "error reading frame {index}"
            )));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(media_err)?;
        let data = rgb.data_bytes().map_err(media_err)?.to_vec();

        Ok(Frame {
            index,
            width: rgb.cols() as u32,
            height: rgb.rows() as u32,
            rgb: data,
        })
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let _ = capture.release();
        }
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        self.release();
    }
}
