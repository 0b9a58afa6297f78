//! OpenJPEG backend.
//!
//! Implements [`Codec`] and [`EncodeCodec`] over `openjpeg-sys`. The
//! [`MemoryStream`] adapter is handed to OpenJPEG as stream user data and
//! driven through C callbacks; OpenJPEG's own messages are forwarded to
//! `tracing` under the `openjpeg` target.
//!
//! # Safety
//!
//! All OpenJPEG functions are inherently unsafe. Handles are wrapped in
//! owning types whose `Drop` releases them, so a handle can only be freed
//! once and never outlives the buffer its stream reads from or writes to.
//!
//! # Requirements
//!
//! - OpenJPEG 2.x (built by `openjpeg-sys`)
//! - The `ffi-openjpeg` feature enabled

use std::ffi::CStr;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use openjpeg_sys as opj;
use tracing::{debug, error, warn};

use crate::codec::{
    Codec, CodecResult, ContainerFormat, DecodeArea, DecoderParameters, EncodeCodec,
    EncoderParameters, MAX_LAYERS,
};
use crate::error::CodecError;
use crate::image::{Image, ImageComponent};
use crate::stream::{MemoryStream, StreamMode};
use crate::types::{ColorSpace, ProgressionOrder};

/// OpenJPEG codec backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenJpeg;

impl OpenJpeg {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

/// OpenJPEG stream wrapping a boxed [`MemoryStream`].
pub struct OpjStream<'buf> {
    ptr: NonNull<opj::opj_stream_t>,
    // Owned by OpenJPEG once registered; freed by `free_memory`.
    memory: *mut MemoryStream<'buf>,
    _buf: PhantomData<&'buf mut [u8]>,
}

impl OpjStream<'_> {
    fn used(&self) -> usize {
        // SAFETY: `memory` stays valid until opj_stream_destroy runs in Drop.
        unsafe { (*self.memory).used() }
    }
}

impl Drop for OpjStream<'_> {
    fn drop(&mut self) {
        // SAFETY: the stream was created by opj_stream_create and is destroyed
        // only here; destruction frees the user data through `free_memory`.
        unsafe { opj::opj_stream_destroy(self.ptr.as_ptr()) }
    }
}

/// OpenJPEG codec handle plus the image it decoded or encodes.
pub struct OpjSession {
    codec: NonNull<opj::opj_codec_t>,
    image: *mut opj::opj_image_t,
}

impl OpjSession {
    fn new(codec: *mut opj::opj_codec_t, operation: &'static str) -> CodecResult<Self> {
        let codec = NonNull::new(codec).ok_or_else(|| CodecError::new(operation, "no codec for format"))?;
        // SAFETY: codec is a live handle; the callbacks ignore client data.
        unsafe {
            opj::opj_set_error_handler(codec.as_ptr(), Some(log_error), ptr::null_mut());
            opj::opj_set_warning_handler(codec.as_ptr(), Some(log_warning), ptr::null_mut());
            opj::opj_set_info_handler(codec.as_ptr(), Some(log_info), ptr::null_mut());
        }
        Ok(Self {
            codec,
            image: ptr::null_mut(),
        })
    }

    fn replace_image(&mut self, image: *mut opj::opj_image_t) {
        if !self.image.is_null() {
            // SAFETY: the previous image is owned by this session.
            unsafe { opj::opj_image_destroy(self.image) }
        }
        self.image = image;
    }

    fn image(&self, operation: &'static str) -> CodecResult<&opj::opj_image_t> {
        // SAFETY: non-null images are owned by this session until Drop.
        unsafe { self.image.as_ref() }.ok_or_else(|| CodecError::new(operation, "no image in session"))
    }
}

impl Drop for OpjSession {
    fn drop(&mut self) {
        self.replace_image(ptr::null_mut());
        // SAFETY: the codec handle is owned by this session.
        unsafe { opj::opj_destroy_codec(self.codec.as_ptr()) }
    }
}

fn check(ok: opj::OPJ_BOOL, operation: &'static str) -> CodecResult<()> {
    if ok != 0 {
        Ok(())
    } else {
        Err(CodecError::new(operation, "OpenJPEG reported failure"))
    }
}

impl Codec for OpenJpeg {
    type Session = OpjSession;
    type Stream<'buf> = OpjStream<'buf>;

    fn create_stream<'buf>(
        &mut self,
        stream: MemoryStream<'buf>,
        chunk_size: usize,
    ) -> CodecResult<OpjStream<'buf>> {
        let mode = stream.mode();
        let len = stream.len();
        let is_input = c_int::from(mode == StreamMode::Read);

        // SAFETY: the returned handle is checked for null before use.
        let ptr = unsafe { opj::opj_stream_create(chunk_size, is_input) };
        let ptr = NonNull::new(ptr).ok_or_else(|| CodecError::new("opj_stream_create", "allocation failed"))?;

        let memory = Box::into_raw(Box::new(stream));
        // SAFETY: `ptr` is a fresh stream; `memory` is handed over together
        // with its free function so OpenJPEG releases it exactly once.
        unsafe {
            let s = ptr.as_ptr();
            match mode {
                StreamMode::Read => {
                    opj::opj_stream_set_read_function(s, Some(read_memory));
                    opj::opj_stream_set_user_data_length(s, len as u64);
                }
                StreamMode::Write => opj::opj_stream_set_write_function(s, Some(write_memory)),
            }
            opj::opj_stream_set_skip_function(s, Some(skip_memory));
            opj::opj_stream_set_seek_function(s, Some(seek_memory));
            opj::opj_stream_set_user_data(s, memory as *mut c_void, Some(free_memory));
        }

        Ok(OpjStream {
            ptr,
            memory,
            _buf: PhantomData,
        })
    }

    fn create_decompress(&mut self, format: ContainerFormat) -> CodecResult<OpjSession> {
        // SAFETY: plain constructor call.
        let codec = unsafe { opj::opj_create_decompress(codec_format(format)) };
        OpjSession::new(codec, "opj_create_decompress")
    }

    fn setup_decoder(&mut self, session: &mut OpjSession, params: &DecoderParameters) -> CodecResult<()> {
        // SAFETY: zeroed is a valid bit pattern for this plain C struct and is
        // overwritten by the defaults call.
        let mut raw: opj::opj_dparameters_t = unsafe { std::mem::zeroed() };
        unsafe { opj::opj_set_default_decoder_parameters(&mut raw) };
        raw.decod_format = -1;
        raw.cod_format = -1;
        raw.cp_reduce = params.reduce;
        raw.cp_layer = params.max_layers;

        // SAFETY: codec handle is live.
        check(
            unsafe { opj::opj_setup_decoder(session.codec.as_ptr(), &mut raw) },
            "opj_setup_decoder",
        )
    }

    fn read_header(&mut self, stream: &mut OpjStream<'_>, session: &mut OpjSession) -> CodecResult<Image> {
        let mut image = ptr::null_mut();
        // SAFETY: stream and codec are live; OpenJPEG allocates the image.
        let ok = unsafe { opj::opj_read_header(stream.ptr.as_ptr(), session.codec.as_ptr(), &mut image) };
        session.replace_image(image);
        check(ok, "opj_read_header")?;
        convert_image(session.image("opj_read_header")?, false)
    }

    fn set_decode_area(&mut self, session: &mut OpjSession, _image: &Image, area: DecodeArea) -> CodecResult<()> {
        session.image("opj_set_decode_area")?;
        // SAFETY: codec and image are live and owned by the session.
        check(
            unsafe {
                opj::opj_set_decode_area(session.codec.as_ptr(), session.image, area.x0, area.y0, area.x1, area.y1)
            },
            "opj_set_decode_area",
        )
    }

    fn decode(&mut self, session: &mut OpjSession, stream: &mut OpjStream<'_>, image: &mut Image) -> CodecResult<()> {
        session.image("opj_decode")?;
        // SAFETY: codec, stream and image are live.
        check(
            unsafe { opj::opj_decode(session.codec.as_ptr(), stream.ptr.as_ptr(), session.image) },
            "opj_decode",
        )?;
        *image = convert_image(session.image("opj_decode")?, true)?;
        Ok(())
    }

    fn end_decompress(&mut self, session: &mut OpjSession, stream: &mut OpjStream<'_>) -> CodecResult<()> {
        // SAFETY: codec and stream are live.
        check(
            unsafe { opj::opj_end_decompress(session.codec.as_ptr(), stream.ptr.as_ptr()) },
            "opj_end_decompress",
        )
    }

    fn destroy_codec(&mut self, session: OpjSession) {
        drop(session);
    }

    fn destroy_stream(&mut self, stream: OpjStream<'_>) {
        drop(stream);
    }
}

impl EncodeCodec for OpenJpeg {
    fn create_compress(&mut self, format: ContainerFormat) -> CodecResult<OpjSession> {
        // SAFETY: plain constructor call.
        let codec = unsafe { opj::opj_create_compress(codec_format(format)) };
        OpjSession::new(codec, "opj_create_compress")
    }

    fn setup_encoder(&mut self, session: &mut OpjSession, params: &EncoderParameters, image: &Image) -> CodecResult<()> {
        // SAFETY: as in setup_decoder.
        let mut raw: opj::opj_cparameters_t = unsafe { std::mem::zeroed() };
        unsafe { opj::opj_set_default_encoder_parameters(&mut raw) };

        raw.numresolution = params.num_resolutions as c_int;
        raw.cblockw_init = params.code_block_width as c_int;
        raw.cblockh_init = params.code_block_height as c_int;
        raw.irreversible = c_int::from(params.irreversible);
        raw.prog_order = prog_order(params.progression_order);
        raw.subsampling_dx = params.subsampling_dx as c_int;
        raw.subsampling_dy = params.subsampling_dy as c_int;
        raw.image_offset_x0 = params.image_offset_x0 as c_int;
        raw.image_offset_y0 = params.image_offset_y0 as c_int;
        if let Some((tw, th)) = params.tile_size {
            raw.tile_size_on = 1;
            raw.cp_tdx = tw as c_int;
            raw.cp_tdy = th as c_int;
        }
        if params.rates.is_empty() {
            raw.tcp_numlayers = 1;
            raw.tcp_rates[0] = 0.0;
        } else {
            let layers = params.rates.len().min(MAX_LAYERS);
            raw.tcp_rates[..layers].copy_from_slice(&params.rates[..layers]);
            raw.tcp_numlayers = layers as c_int;
        }
        raw.cp_disto_alloc = 1;
        raw.tcp_mct = (image.components.len() >= 3) as c_char;

        session.replace_image(create_raw_image(image)?);
        // SAFETY: codec and image are live and owned by the session.
        check(
            unsafe { opj::opj_setup_encoder(session.codec.as_ptr(), &mut raw, session.image) },
            "opj_setup_encoder",
        )
    }

    fn start_compress(&mut self, session: &mut OpjSession, _image: &Image, stream: &mut OpjStream<'_>) -> CodecResult<()> {
        session.image("opj_start_compress")?;
        // SAFETY: codec, image and stream are live.
        check(
            unsafe { opj::opj_start_compress(session.codec.as_ptr(), session.image, stream.ptr.as_ptr()) },
            "opj_start_compress",
        )
    }

    fn encode(&mut self, session: &mut OpjSession, stream: &mut OpjStream<'_>) -> CodecResult<()> {
        // SAFETY: codec and stream are live.
        check(
            unsafe { opj::opj_encode(session.codec.as_ptr(), stream.ptr.as_ptr()) },
            "opj_encode",
        )
    }

    fn end_compress(&mut self, session: &mut OpjSession, stream: &mut OpjStream<'_>) -> CodecResult<()> {
        // SAFETY: codec and stream are live.
        check(
            unsafe { opj::opj_end_compress(session.codec.as_ptr(), stream.ptr.as_ptr()) },
            "opj_end_compress",
        )
    }

    fn bytes_written(&self, stream: &OpjStream<'_>) -> usize {
        stream.used()
    }
}

fn codec_format(format: ContainerFormat) -> opj::OPJ_CODEC_FORMAT {
    match format {
        ContainerFormat::Codestream => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_J2K,
        ContainerFormat::Jp2 => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JP2,
        ContainerFormat::Jpt => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JPT,
    }
}

fn prog_order(order: ProgressionOrder) -> opj::OPJ_PROG_ORDER {
    use opj::OPJ_PROG_ORDER::*;
    match order {
        ProgressionOrder::Lrcp => OPJ_LRCP,
        ProgressionOrder::Rlcp => OPJ_RLCP,
        ProgressionOrder::Rpcl => OPJ_RPCL,
        ProgressionOrder::Pcrl => OPJ_PCRL,
        ProgressionOrder::Cprl => OPJ_CPRL,
    }
}

impl From<opj::COLOR_SPACE> for ColorSpace {
    fn from(color: opj::COLOR_SPACE) -> Self {
        use opj::COLOR_SPACE::*;
        match color {
            OPJ_CLRSPC_UNKNOWN => ColorSpace::Unknown,
            OPJ_CLRSPC_UNSPECIFIED => ColorSpace::Unspecified,
            OPJ_CLRSPC_SRGB => ColorSpace::Srgb,
            OPJ_CLRSPC_GRAY => ColorSpace::Grayscale,
            OPJ_CLRSPC_SYCC => ColorSpace::YCbCr,
            OPJ_CLRSPC_EYCC => ColorSpace::ExtendedYCbCr,
            OPJ_CLRSPC_CMYK => ColorSpace::Cmyk,
        }
    }
}

impl From<ColorSpace> for opj::COLOR_SPACE {
    fn from(color: ColorSpace) -> Self {
        use opj::COLOR_SPACE::*;
        match color {
            ColorSpace::Unknown => OPJ_CLRSPC_UNKNOWN,
            ColorSpace::Unspecified => OPJ_CLRSPC_UNSPECIFIED,
            ColorSpace::Srgb => OPJ_CLRSPC_SRGB,
            ColorSpace::Grayscale => OPJ_CLRSPC_GRAY,
            ColorSpace::YCbCr => OPJ_CLRSPC_SYCC,
            ColorSpace::ExtendedYCbCr => OPJ_CLRSPC_EYCC,
            ColorSpace::Cmyk => OPJ_CLRSPC_CMYK,
        }
    }
}

/// Copy an OpenJPEG image into an owned [`Image`].
fn convert_image(raw: &opj::opj_image_t, with_data: bool) -> CodecResult<Image> {
    let mut image = Image::new(raw.x0, raw.y0, raw.x1, raw.y1, raw.color_space.into());

    let comps: &[opj::opj_image_comp_t] = if raw.comps.is_null() {
        &[]
    } else {
        // SAFETY: OpenJPEG allocates `numcomps` components.
        unsafe { std::slice::from_raw_parts(raw.comps, raw.numcomps as usize) }
    };
    for comp in comps {
        let samples = comp.w as usize * comp.h as usize;
        let data = if with_data && !comp.data.is_null() {
            // SAFETY: decoded planes hold w * h samples.
            unsafe { std::slice::from_raw_parts(comp.data, samples) }.to_vec()
        } else {
            Vec::new()
        };
        image.components.push(ImageComponent {
            dx: comp.dx,
            dy: comp.dy,
            width: comp.w,
            height: comp.h,
            x0: comp.x0,
            y0: comp.y0,
            precision: comp.prec,
            signed: comp.sgnd != 0,
            factor: comp.factor,
            alpha: comp.alpha != 0,
            data,
        });
    }

    if !raw.icc_profile_buf.is_null() && raw.icc_profile_len > 0 {
        // SAFETY: buffer length is reported alongside the pointer.
        let icc = unsafe { std::slice::from_raw_parts(raw.icc_profile_buf, raw.icc_profile_len as usize) };
        image.icc_profile = Some(icc.to_vec());
    }

    if with_data && comps.iter().any(|c| c.data.is_null()) {
        return Err(CodecError::new("opj_decode", "component without sample data"));
    }
    debug!(components = comps.len(), with_data, "copied OpenJPEG image");
    Ok(image)
}

/// Create an OpenJPEG image holding a copy of `image`.
fn create_raw_image(image: &Image) -> CodecResult<*mut opj::opj_image_t> {
    let mut params: Vec<opj::opj_image_cmptparm_t> = image
        .components
        .iter()
        .map(|c| {
            // SAFETY: all-zero is a valid value for this plain C struct.
            let mut p: opj::opj_image_cmptparm_t = unsafe { std::mem::zeroed() };
            p.dx = c.dx;
            p.dy = c.dy;
            p.w = c.width;
            p.h = c.height;
            p.x0 = c.x0;
            p.y0 = c.y0;
            p.prec = c.precision;
            p.sgnd = u32::from(c.signed);
            p
        })
        .collect();

    // SAFETY: `params` holds numcomps entries for the duration of the call.
    let raw = unsafe {
        opj::opj_image_create(
            params.len() as u32,
            params.as_mut_ptr(),
            image.color_space.into(),
        )
    };
    if raw.is_null() {
        return Err(CodecError::new("opj_image_create", "allocation failed"));
    }

    // SAFETY: `raw` is a fresh image with one allocated plane per component.
    unsafe {
        (*raw).x0 = image.x0;
        (*raw).y0 = image.y0;
        (*raw).x1 = image.x1;
        (*raw).y1 = image.y1;
        let comps = std::slice::from_raw_parts_mut((*raw).comps, image.components.len());
        for (dst, src) in comps.iter_mut().zip(&image.components) {
            let samples = src.num_samples();
            if src.data.len() < samples || dst.data.is_null() {
                opj::opj_image_destroy(raw);
                return Err(CodecError::new(
                    "opj_image_create",
                    format!("component has {} samples, needs {samples}", src.data.len()),
                ));
            }
            ptr::copy_nonoverlapping(src.data.as_ptr(), dst.data, samples);
            dst.alpha = u16::from(src.alpha);
        }
    }
    Ok(raw)
}

unsafe extern "C" fn read_memory(buffer: *mut c_void, nb_bytes: usize, user_data: *mut c_void) -> usize {
    if buffer.is_null() || user_data.is_null() {
        return usize::MAX;
    }
    let stream = &mut *(user_data as *mut MemoryStream<'_>);
    let dest = std::slice::from_raw_parts_mut(buffer as *mut u8, nb_bytes);
    stream.read(dest).unwrap_or(usize::MAX)
}

unsafe extern "C" fn write_memory(buffer: *mut c_void, nb_bytes: usize, user_data: *mut c_void) -> usize {
    if buffer.is_null() || user_data.is_null() {
        return usize::MAX;
    }
    let stream = &mut *(user_data as *mut MemoryStream<'_>);
    let src = std::slice::from_raw_parts(buffer as *const u8, nb_bytes);
    match stream.write(src) {
        Ok(written) => written,
        Err(e) => {
            error!(target: "openjpeg", error = %e, "memory stream write failed");
            usize::MAX
        }
    }
}

unsafe extern "C" fn skip_memory(nb_bytes: i64, user_data: *mut c_void) -> i64 {
    if user_data.is_null() {
        return -1;
    }
    let stream = &mut *(user_data as *mut MemoryStream<'_>);
    stream.skip(nb_bytes).unwrap_or(-1)
}

unsafe extern "C" fn seek_memory(nb_bytes: i64, user_data: *mut c_void) -> opj::OPJ_BOOL {
    if user_data.is_null() {
        return 0;
    }
    let stream = &mut *(user_data as *mut MemoryStream<'_>);
    match u64::try_from(nb_bytes) {
        Ok(pos) => opj::OPJ_BOOL::from(stream.seek(pos).is_ok()),
        Err(_) => 0,
    }
}

unsafe extern "C" fn free_memory(user_data: *mut c_void) {
    if !user_data.is_null() {
        drop(Box::from_raw(user_data as *mut MemoryStream<'_>));
    }
}

unsafe fn message(msg: *const c_char) -> String {
    if msg.is_null() {
        return String::new();
    }
    CStr::from_ptr(msg).to_string_lossy().trim_end().to_owned()
}

unsafe extern "C" fn log_error(msg: *const c_char, _client_data: *mut c_void) {
    error!(target: "openjpeg", "{}", message(msg));
}

unsafe extern "C" fn log_warning(msg: *const c_char, _client_data: *mut c_void) {
    warn!(target: "openjpeg", "{}", message(msg));
}

unsafe extern "C" fn log_info(msg: *const c_char, _client_data: *mut c_void) {
    debug!(target: "openjpeg", "{}", message(msg));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncoderParameters;
    use crate::decoder::decompress;
    use crate::encoder::compress;
    use crate::raw::{image_from_raw, RawImageParams};
    use crate::types::OutputFormat;

    #[test]
    fn test_color_space_mapping() {
        for cs in [
            ColorSpace::Unknown,
            ColorSpace::Srgb,
            ColorSpace::Grayscale,
            ColorSpace::YCbCr,
            ColorSpace::Cmyk,
        ] {
            assert_eq!(ColorSpace::from(opj::COLOR_SPACE::from(cs)), cs);
        }
    }

    #[test]
    fn test_garbage_header_fails_cleanly() {
        let mut codec = OpenJpeg::new();
        let err = decompress(&mut codec, &[0xFF, 0x4F, 0x00, 0x01], ContainerFormat::Codestream, OutputFormat::Pxm)
            .unwrap_err();
        assert!(matches!(err, crate::Jpeg2000Error::HeaderReadFailed(_)));
    }

    #[test]
    fn test_lossless_round_trip() {
        let (w, h) = (16u32, 8u32);
        let pixels: Vec<u8> = (0..w * h * 3).map(|i| (i * 7 % 251) as u8).collect();
        let image = image_from_raw(&pixels, &RawImageParams::new(w, h, 3), &EncoderParameters::default()).unwrap();

        let mut codec = OpenJpeg::new();
        let mut out = vec![0u8; 64 * 1024];
        let written = compress(&mut codec, &image, &EncoderParameters::lossless(), &mut out).unwrap();
        assert!(written > 0);

        let decoded = decompress(&mut codec, &out[..written], ContainerFormat::Codestream, OutputFormat::Pxm).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (w, h));
        assert_eq!(decoded.to_rgb_bytes().unwrap(), pixels);
    }

    #[test]
    fn test_output_too_small() {
        let pixels = vec![0x55u8; 64 * 64];
        let image = image_from_raw(&pixels, &RawImageParams::new(64, 64, 1), &EncoderParameters::default()).unwrap();
        let mut codec = OpenJpeg::new();
        let mut out = [0u8; 16];
        assert!(compress(&mut codec, &image, &EncoderParameters::default(), &mut out).is_err());
    }
}
