//! Streaming KML output for cluster maps.
//!
//! Only the handful of elements needed to draw clusters are supported. Elements are written as
//! soon as they are started, so the caller is responsible for closing every tag it opens. Files
//! may be written as plain KML or as a KMZ archive holding a single `doc.kml`.

use crate::OutageResult;
use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Escape the characters that can't appear in XML text.
fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(|c: char| matches!(c, '&' | '<' | '>' | '"')) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }

    Cow::Owned(escaped)
}

/// A plain KML file on disk.
///
/// The document header is written on creation, the footer by `finish` or when dropped.
pub struct KmlFile {
    out: BufWriter<File>,
    finished: bool,
}

impl KmlFile {
    pub fn new<P: AsRef<Path>>(pth: P) -> OutageResult<Self> {
        let f = File::create(pth.as_ref())?;

        let mut new = KmlFile {
            out: BufWriter::new(f),
            finished: false,
        };
        new.start_document()?;

        Ok(new)
    }

    /// Close the document and flush it to disk.
    pub fn finish(&mut self) -> OutageResult<()> {
        if !self.finished {
            self.finished = true;
            self.finish_document()?;
            self.out.flush()?;
        }

        Ok(())
    }
}

impl KmlWriter for KmlFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.out
    }
}

impl Drop for KmlFile {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("error closing KML file: {}", err);
        }
    }
}

/// A zipped KML file on disk.
pub struct KmzFile {
    zip: ZipWriter<File>,
    finished: bool,
}

impl KmzFile {
    pub fn new<P: AsRef<Path>>(pth: P) -> OutageResult<Self> {
        let f = File::create(pth.as_ref())?;

        let mut zip = ZipWriter::new(f);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("doc.kml", options)?;

        let mut new = KmzFile {
            zip,
            finished: false,
        };
        new.start_document()?;

        Ok(new)
    }

    /// Close the document and write the archive's central directory.
    pub fn finish(&mut self) -> OutageResult<()> {
        if !self.finished {
            self.finished = true;
            self.finish_document()?;
            self.zip.finish()?;
        }

        Ok(())
    }
}

impl KmlWriter for KmzFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.zip
    }
}

impl Drop for KmzFile {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("error closing KMZ file: {}", err);
        }
    }
}

pub trait KmlWriter {
    /// Where the elements get written.
    fn output(&mut self) -> &mut dyn Write;

    /// Write the XML declaration and open the document.
    fn start_document(&mut self) -> OutageResult<()> {
        const HEADER: &str = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "\n",
            r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#,
            "\n",
            "<Document>\n"
        );

        self.output().write_all(HEADER.as_bytes())?;
        Ok(())
    }

    /// Close the document.
    fn finish_document(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</Document>\n</kml>\n")?;
        Ok(())
    }

    /// Write a name element, escaping as needed.
    fn write_name(&mut self, name: &str) -> OutageResult<()> {
        writeln!(self.output(), "<name>{}</name>", escape(name))?;
        Ok(())
    }

    /// Write a description element. The description may contain HTML.
    ///
    /// A `]]>` in the description is split across two CDATA sections.
    fn write_description(&mut self, description: &str) -> OutageResult<()> {
        writeln!(
            self.output(),
            "<description><![CDATA[{}]]></description>",
            description.replace("]]>", "]]]]><![CDATA[>")
        )?;
        Ok(())
    }

    fn start_folder(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        is_open: bool,
    ) -> OutageResult<()> {
        self.output().write_all(b"<Folder>\n")?;

        if let Some(name) = name {
            self.write_name(name)?;
        }

        if let Some(description) = description {
            self.write_description(description)?;
        }

        if is_open {
            self.output().write_all(b"<open>1</open>\n")?;
        }

        Ok(())
    }

    fn finish_folder(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</Folder>\n")?;
        Ok(())
    }

    fn start_placemark(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        style_url: Option<&str>,
    ) -> OutageResult<()> {
        self.output().write_all(b"<Placemark>\n")?;

        if let Some(name) = name {
            self.write_name(name)?;
        }

        if let Some(description) = description {
            self.write_description(description)?;
        }

        if let Some(style_url) = style_url {
            writeln!(self.output(), "<styleUrl>{}</styleUrl>", escape(style_url))?;
        }

        Ok(())
    }

    fn finish_placemark(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</Placemark>\n")?;
        Ok(())
    }

    /// Start a style definition, shared styles need an id so placemarks can refer to them.
    fn start_style(&mut self, style_id: Option<&str>) -> OutageResult<()> {
        match style_id {
            Some(id) => writeln!(self.output(), "<Style id=\"{}\">", escape(id))?,
            None => self.output().write_all(b"<Style>\n")?,
        }
        Ok(())
    }

    fn finish_style(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</Style>\n")?;
        Ok(())
    }

    /**
     * Write a PolyStyle element. Only valid inside a style.
     *
     * #Arguments
     * * color - an aabbggrr hex string, `None` for random colors.
     * * filled - whether to fill the polygon.
     * * outlined - whether to draw the polygon's outline.
     */
    fn create_poly_style(
        &mut self,
        color: Option<&str>,
        filled: bool,
        outlined: bool,
    ) -> OutageResult<()> {
        let out = self.output();
        out.write_all(b"<PolyStyle>\n")?;

        match color {
            Some(color) => {
                writeln!(out, "<color>{}</color>", color)?;
                out.write_all(b"<colorMode>normal</colorMode>\n")?;
            }
            None => out.write_all(b"<colorMode>random</colorMode>\n")?,
        }

        writeln!(out, "<fill>{}</fill>", u8::from(filled))?;
        writeln!(out, "<outline>{}</outline>", u8::from(outlined))?;
        out.write_all(b"</PolyStyle>\n")?;

        Ok(())
    }

    /// Write an IconStyle element, a non-positive scale is written as 1.
    fn create_icon_style(&mut self, icon_url: Option<&str>, scale: f64) -> OutageResult<()> {
        let scale = if scale > 0.0 { scale } else { 1.0 };

        let out = self.output();
        writeln!(out, "<IconStyle>\n<scale>{}</scale>", scale)?;
        if let Some(icon_url) = icon_url {
            writeln!(out, "<Icon><href>{}</href></Icon>", escape(icon_url))?;
        }
        out.write_all(b"</IconStyle>\n")?;

        Ok(())
    }

    fn timespan(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> OutageResult<()> {
        writeln!(
            self.output(),
            "<TimeSpan>\n<begin>{}</begin>\n<end>{}</end>\n</TimeSpan>",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        Ok(())
    }

    fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> OutageResult<()> {
        let out = self.output();
        out.write_all(b"<Polygon>\n")?;

        if let Some(altitude_mode) = altitude_mode {
            debug_assert!(matches!(
                altitude_mode,
                "clampToGround" | "relativeToGround" | "absolute"
            ));
            writeln!(out, "<altitudeMode>{}</altitudeMode>", altitude_mode)?;
        }

        if extrude {
            out.write_all(b"<extrude>1</extrude>\n")?;
        }

        if tessellate {
            out.write_all(b"<tessellate>1</tessellate>\n")?;
        }

        Ok(())
    }

    fn finish_polygon(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</Polygon>\n")?;
        Ok(())
    }

    /// Only valid inside a Polygon element.
    fn polygon_start_outer_ring(&mut self) -> OutageResult<()> {
        self.output().write_all(b"<outerBoundaryIs>\n")?;
        Ok(())
    }

    fn polygon_finish_outer_ring(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</outerBoundaryIs>\n")?;
        Ok(())
    }

    fn start_linear_ring(&mut self) -> OutageResult<()> {
        self.output().write_all(b"<LinearRing>\n<coordinates>\n")?;
        Ok(())
    }

    fn finish_linear_ring(&mut self) -> OutageResult<()> {
        self.output().write_all(b"</coordinates>\n</LinearRing>\n")?;
        Ok(())
    }

    /// Add a vertex, only valid between `start_linear_ring` and `finish_linear_ring`.
    fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> OutageResult<()> {
        // KML wants longitude first.
        writeln!(self.output(), "{},{},{}", lon, lat, z)?;
        Ok(())
    }

    fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> OutageResult<()> {
        writeln!(
            self.output(),
            "<Point>\n<coordinates>{},{},{}</coordinates>\n</Point>",
            lon,
            lat,
            z
        )?;
        Ok(())
    }
}
