use anyhow::{bail, Context, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use std::io::Write;

/// Page size in points; matches the 2:3 panel ratio.
pub const PAGE_WIDTH: u32 = 480;
pub const PAGE_HEIGHT: u32 = 720;

struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        // Binary marker comment so transfer tools treat the file as binary.
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    /// Objects must be written in id order starting at 1.
    fn object(&mut self, body: &str) {
        self.begin();
        self.buf.extend_from_slice(body.as_bytes());
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, dict: &str, data: &[u8]) {
        self.begin();
        self.buf
            .extend_from_slice(format!("<< {} /Length {} >>\nstream\n", dict, data.len()).as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn begin(&mut self) {
        self.offsets.push(self.buf.len());
        let id = self.offsets.len();
        self.buf.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for offset in &self.offsets {
            table.push_str(&format!("{:010} 00000 n \n", offset));
        }
        table.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_offset
        ));
        self.buf.extend_from_slice(table.as_bytes());
        self.buf
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish().context("Failed to compress page image")
}

/// One full-bleed image per page, stretched to the page box.
pub fn write_pdf(pages: &[RgbImage]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        bail!("No pages to write");
    }

    // 1: catalog, 2: page tree, then page / content / image per page.
    let page_id = |i: usize| 3 + i * 3;
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", page_id(i)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut pdf = PdfWriter::new();
    pdf.object("<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        pages.len()
    ));

    let draw = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", PAGE_WIDTH, PAGE_HEIGHT);
    for (i, img) in pages.iter().enumerate() {
        let id = page_id(i);
        pdf.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /XObject << /Im0 {} 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            id + 2,
            id + 1
        ));
        pdf.stream("", draw.as_bytes());
        let pixels = deflate(img.as_raw())?;
        pdf.stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode",
                img.width(),
                img.height()
            ),
            &pixels,
        );
    }

    Ok(pdf.finish())
}

/// Number of leaf pages in a document produced by [`write_pdf`].
pub fn page_count(pdf: &[u8]) -> usize {
    let needle = b"/Type /Page /";
    pdf.windows(needle.len()).filter(|w| *w == &needle[..]).count()
}
