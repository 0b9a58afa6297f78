//! Resource-tracking codec used by the pipeline tests.
//!
//! Streams are plain [`MemoryStream`]s. Every create/destroy is counted and
//! any step can be made to fail.

#![allow(dead_code)]

use opj_membuf::{
    Codec, CodecError, CodecResult, ColorSpace, ContainerFormat, DecodeArea, DecoderParameters,
    EncodeCodec, EncoderParameters, Image, ImageComponent, MemoryStream,
};
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness (`RUST_LOG=opj_membuf=debug`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend entry points, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateStream,
    CreateDecompress,
    SetupDecoder,
    ReadHeader,
    SetDecodeArea,
    Decode,
    EndDecompress,
    CreateCompress,
    SetupEncoder,
    StartCompress,
    Encode,
    EndCompress,
}

/// Session handle; deliberately not `Copy` so it can only be released once.
#[derive(Debug)]
pub struct MockSession {
    pub id: usize,
    pub compress: bool,
}

#[derive(Debug, Default)]
pub struct MockCodec {
    /// Step that returns an error.
    pub fail_at: Option<Step>,
    /// Descriptor returned by `read_header`.
    pub header: Image,
    /// Planes copied in by `decode`; when absent samples are read from the stream.
    pub planes: Option<Vec<Vec<i32>>>,

    pub calls: Vec<Step>,
    pub formats: Vec<ContainerFormat>,
    pub areas: Vec<DecodeArea>,
    pub decoder_params: Vec<DecoderParameters>,
    pub stream_lens: Vec<usize>,
    pub chunk_sizes: Vec<usize>,

    pub streams_created: usize,
    pub streams_destroyed: usize,
    pub sessions_created: usize,
    pub sessions_destroyed: usize,
    pub destroyed_ids: Vec<usize>,
}

impl MockCodec {
    /// Codec serving a header built from `components` on a `width` x `height` grid.
    pub fn with_header(width: u32, height: u32, color_space: ColorSpace, subsampling: &[(u32, u32)]) -> Self {
        let mut header = Image::new(0, 0, width, height, color_space);
        for &(dx, dy) in subsampling {
            header
                .components
                .push(ImageComponent::on_grid((0, 0, width, height), dx, dy, 8, false));
        }
        Self {
            header,
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, step: Step) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn with_planes(mut self, planes: Vec<Vec<i32>>) -> Self {
        self.planes = Some(planes);
        self
    }

    /// Every created stream and session was released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.streams_created == self.streams_destroyed
            && self.sessions_created == self.sessions_destroyed
            && self.destroyed_ids.len() == self.sessions_created
    }

    fn step(&mut self, step: Step) -> CodecResult<()> {
        self.calls.push(step);
        if self.fail_at == Some(step) {
            Err(CodecError::new("mock", format!("{step:?} failed")))
        } else {
            Ok(())
        }
    }

    fn new_session(&mut self, compress: bool) -> MockSession {
        self.sessions_created += 1;
        MockSession {
            id: self.sessions_created,
            compress,
        }
    }
}

fn write_all(stream: &mut MemoryStream<'_>, bytes: &[u8]) -> CodecResult<()> {
    stream
        .write(bytes)
        .map(|_| ())
        .map_err(|e| CodecError::new("write", e.to_string()))
}

impl Codec for MockCodec {
    type Session = MockSession;
    type Stream<'buf> = MemoryStream<'buf>;

    fn create_stream<'buf>(
        &mut self,
        stream: MemoryStream<'buf>,
        chunk_size: usize,
    ) -> CodecResult<MemoryStream<'buf>> {
        self.step(Step::CreateStream)?;
        self.streams_created += 1;
        self.stream_lens.push(stream.len());
        self.chunk_sizes.push(chunk_size);
        Ok(stream)
    }

    fn create_decompress(&mut self, format: ContainerFormat) -> CodecResult<MockSession> {
        self.formats.push(format);
        self.step(Step::CreateDecompress)?;
        Ok(self.new_session(false))
    }

    fn setup_decoder(&mut self, _session: &mut MockSession, params: &DecoderParameters) -> CodecResult<()> {
        self.decoder_params.push(params.clone());
        self.step(Step::SetupDecoder)
    }

    fn read_header(&mut self, _stream: &mut MemoryStream<'_>, _session: &mut MockSession) -> CodecResult<Image> {
        self.step(Step::ReadHeader)?;
        Ok(self.header.clone())
    }

    fn set_decode_area(&mut self, _session: &mut MockSession, _image: &Image, area: DecodeArea) -> CodecResult<()> {
        self.areas.push(area);
        self.step(Step::SetDecodeArea)
    }

    fn decode(&mut self, _session: &mut MockSession, stream: &mut MemoryStream<'_>, image: &mut Image) -> CodecResult<()> {
        self.step(Step::Decode)?;
        match &self.planes {
            Some(planes) => {
                for (comp, plane) in image.components.iter_mut().zip(planes) {
                    comp.data = plane.clone();
                }
            }
            None => {
                for comp in &mut image.components {
                    comp.alloc();
                    for sample in comp.data.iter_mut() {
                        let mut byte = [0u8; 1];
                        *sample = match stream.read(&mut byte) {
                            Some(1) => byte[0] as i32,
                            _ => 0,
                        };
                    }
                }
            }
        }
        Ok(())
    }

    fn end_decompress(&mut self, _session: &mut MockSession, _stream: &mut MemoryStream<'_>) -> CodecResult<()> {
        self.step(Step::EndDecompress)
    }

    fn destroy_codec(&mut self, session: MockSession) {
        self.sessions_destroyed += 1;
        self.destroyed_ids.push(session.id);
    }

    fn destroy_stream(&mut self, _stream: MemoryStream<'_>) {
        self.streams_destroyed += 1;
    }
}

impl EncodeCodec for MockCodec {
    fn create_compress(&mut self, format: ContainerFormat) -> CodecResult<MockSession> {
        self.formats.push(format);
        self.step(Step::CreateCompress)?;
        Ok(self.new_session(true))
    }

    fn setup_encoder(&mut self, _session: &mut MockSession, _params: &EncoderParameters, _image: &Image) -> CodecResult<()> {
        self.step(Step::SetupEncoder)
    }

    fn start_compress(&mut self, session: &mut MockSession, image: &Image, stream: &mut MemoryStream<'_>) -> CodecResult<()> {
        assert!(session.compress);
        self.step(Step::StartCompress)?;
        write_all(stream, &[0xFF, 0x4F])?;
        write_all(stream, &image.width().to_be_bytes())?;
        write_all(stream, &image.height().to_be_bytes())?;
        self.header = image.clone();
        Ok(())
    }

    fn encode(&mut self, _session: &mut MockSession, stream: &mut MemoryStream<'_>) -> CodecResult<()> {
        self.step(Step::Encode)?;
        let samples: Vec<u8> = self
            .header
            .components
            .iter()
            .flat_map(|c| c.data.iter().map(|&v| v as u8))
            .collect();
        write_all(stream, &samples)
    }

    fn end_compress(&mut self, _session: &mut MockSession, stream: &mut MemoryStream<'_>) -> CodecResult<()> {
        self.step(Step::EndCompress)?;
        write_all(stream, &[0xFF, 0xD9])
    }

    fn bytes_written(&self, stream: &MemoryStream<'_>) -> usize {
        stream.used()
    }
}
