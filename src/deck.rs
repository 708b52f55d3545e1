//! Minimal PresentationML writer.
//!
//! Produces a self-contained `.pptx` package (one master, a "Title Slide" and a
//! "Title and Content" layout, one theme) with explicitly positioned title and
//! body shapes on every slide, so the file opens without any template.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use quick_xml::escape::{escape, resolve_predefined_entity};
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// 4:3 slide in EMU
const SLIDE_CX: i64 = 9_144_000;
const SLIDE_CY: i64 = 6_858_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideLayout {
    Title,
    TitleAndContent,
}

impl SlideLayout {
    fn part_index(self) -> usize {
        match self {
            SlideLayout::Title => 1,
            SlideLayout::TitleAndContent => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub layout: SlideLayout,
    pub title: String,
    pub body: String,
}

/// Text recovered from a written slide
#[derive(Debug, Clone, PartialEq)]
pub struct SlideText {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_slide(&mut self, layout: SlideLayout, title: impl Into<String>, body: impl Into<String>) -> &mut Self {
        self.slides.push(Slide {
            layout,
            title: title.into(),
            body: body.into(),
        });
        self
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut put = |name: &str, body: String| -> Result<()> {
            zip.start_file(name, options)
                .with_context(|| format!("Failed to start {}", name))?;
            zip.write_all(body.as_bytes())?;
            Ok(())
        };

        put("[Content_Types].xml", self.content_types())?;
        put("_rels/.rels", root_rels())?;
        put("docProps/app.xml", app_props(self.slides.len()))?;
        put("docProps/core.xml", core_props())?;
        put("ppt/presentation.xml", self.presentation())?;
        put("ppt/_rels/presentation.xml.rels", self.presentation_rels())?;
        put("ppt/slideMasters/slideMaster1.xml", slide_master())?;
        put(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
                ("rId2", "slideLayout", "../slideLayouts/slideLayout2.xml"),
                ("rId3", "theme", "../theme/theme1.xml"),
            ]),
        )?;
        put("ppt/slideLayouts/slideLayout1.xml", slide_layout("title", "Title Slide"))?;
        put("ppt/slideLayouts/slideLayout2.xml", slide_layout("obj", "Title and Content"))?;
        for i in 1..=2 {
            put(
                &format!("ppt/slideLayouts/_rels/slideLayout{}.xml.rels", i),
                rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]),
            )?;
        }
        put("ppt/theme/theme1.xml", theme())?;

        for (i, slide) in self.slides.iter().enumerate() {
            let n = i + 1;
            put(&format!("ppt/slides/slide{}.xml", n), slide_xml(slide))?;
            put(
                &format!("ppt/slides/_rels/slide{}.xml.rels", n),
                rels(&[(
                    "rId1",
                    "slideLayout",
                    &format!("../slideLayouts/slideLayout{}.xml", slide.layout.part_index()),
                )]),
            )?;
        }

        let cursor = zip.finish().context("Failed to finalise pptx archive")?;
        Ok(cursor.into_inner())
    }

    /// Write the deck, replacing any existing file at `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn content_types(&self) -> String {
        let mut overrides = String::new();
        let mut add = |part: &str, kind: &str| {
            overrides.push_str(&format!(r#"<Override PartName="/{}" ContentType="{}"/>"#, part, kind));
        };
        add(
            "ppt/presentation.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml",
        );
        add(
            "ppt/slideMasters/slideMaster1.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml",
        );
        for i in 1..=2 {
            add(
                &format!("ppt/slideLayouts/slideLayout{}.xml", i),
                "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml",
            );
        }
        for i in 1..=self.slides.len() {
            add(
                &format!("ppt/slides/slide{}.xml", i),
                "application/vnd.openxmlformats-officedocument.presentationml.slide+xml",
            );
        }
        add("ppt/theme/theme1.xml", "application/vnd.openxmlformats-officedocument.theme+xml");
        add("docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml");
        add(
            "docProps/app.xml",
            "application/vnd.openxmlformats-officedocument.extended-properties+xml",
        );

        format!(
            r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        )
    }

    fn presentation(&self) -> String {
        let slide_ids: String = (0..self.slides.len())
            .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 3))
            .collect();
        format!(
            r#"{XML_DECL}<p:presentation {NS} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="{SLIDE_CX}" cy="{SLIDE_CY}" type="screen4x3"/><p:notesSz cx="{SLIDE_CY}" cy="{SLIDE_CX}"/></p:presentation>"#
        )
    }

    fn presentation_rels(&self) -> String {
        let mut entries: Vec<(String, &str, String)> = vec![
            ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
            ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
        ];
        for i in 0..self.slides.len() {
            entries.push((format!("rId{}", i + 3), "slide", format!("slides/slide{}.xml", i + 1)));
        }
        let borrowed: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(id, kind, target)| (id.as_str(), *kind, target.as_str()))
            .collect();
        rels(&borrowed)
    }
}

/// Read back the title and body text of every slide, in slide order
pub fn read_slides(path: &Path) -> Result<Vec<SlideText>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(file).context("Not a zip archive")?;

    let mut numbers: Vec<usize> = archive
        .file_names()
        .filter_map(|name| {
            name.strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()
        })
        .collect();
    numbers.sort_unstable();

    let mut slides = Vec::with_capacity(numbers.len());
    for n in numbers {
        let mut xml = String::new();
        archive
            .by_name(&format!("ppt/slides/slide{}.xml", n))?
            .read_to_string(&mut xml)?;

        slides.push(slide_text(&xml).with_context(|| format!("Malformed slide {}", n))?);
    }
    Ok(slides)
}

/// First shape is the title, second the body; paragraphs are joined by newlines
fn slide_text(xml: &str) -> Result<SlideText> {
    let mut reader = Reader::from_str(xml);
    let mut shapes: Vec<Vec<String>> = Vec::new();
    let mut in_shape = false;
    let mut in_run_text = false;

    fn push(shapes: &mut [Vec<String>], text: &str) {
        if let Some(paragraph) = shapes.last_mut().and_then(|s| s.last_mut()) {
            paragraph.push_str(text);
        }
    }

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"p:sp" => {
                    shapes.push(Vec::new());
                    in_shape = true;
                }
                b"a:p" if in_shape => {
                    if let Some(shape) = shapes.last_mut() {
                        shape.push(String::new());
                    }
                }
                b"a:t" if in_shape => in_run_text = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"p:sp" => in_shape = false,
                b"a:t" => in_run_text = false,
                _ => {}
            },
            Event::Text(t) if in_run_text => push(&mut shapes, &t.decode()?),
            Event::GeneralRef(r) if in_run_text => {
                if let Some(c) = r.resolve_char_ref()? {
                    push(&mut shapes, c.encode_utf8(&mut [0; 4]));
                } else {
                    let name = r.decode()?;
                    let resolved = resolve_predefined_entity(&name).ok_or_else(|| anyhow!("unknown entity &{};", name))?;
                    push(&mut shapes, resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut shapes = shapes.into_iter().map(|paragraphs| paragraphs.join("\n"));
    Ok(SlideText {
        title: shapes.next().unwrap_or_default(),
        body: shapes.next().unwrap_or_default(),
    })
}

fn slide_xml(slide: &Slide) -> String {
    let (title_ph, body_ph, title_box, body_box, title_size) = match slide.layout {
        SlideLayout::Title => (
            r#"<p:ph type="ctrTitle"/>"#,
            r#"<p:ph type="subTitle" idx="1"/>"#,
            (685_800, 2_130_425, 7_772_400, 1_470_025),
            (1_371_600, 3_886_200, 6_400_800, 1_752_600),
            4400,
        ),
        SlideLayout::TitleAndContent => (
            r#"<p:ph type="title"/>"#,
            r#"<p:ph idx="1"/>"#,
            (457_200, 274_638, 8_229_600, 1_143_000),
            (457_200, 1_600_200, 8_229_600, 4_525_963),
            3600,
        ),
    };

    format!(
        r#"{XML_DECL}<p:sld {NS}><p:cSld><p:spTree>{group}{title}{body}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        group = group_header(),
        title = text_shape(2, "Title 1", title_ph, title_box, title_size, &slide.title),
        body = text_shape(3, "Content Placeholder 2", body_ph, body_box, 2000, &slide.body),
    )
}

fn text_shape(id: u32, name: &str, placeholder: &str, (x, y, cx, cy): (i64, i64, i64, i64), size: u32, text: &str) -> String {
    let paragraphs: String = text
        .lines()
        .map(|line| {
            format!(
                r#"<a:p><a:r><a:rPr lang="en-US" sz="{size}" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
                xml_text(line)
            )
        })
        .collect();
    let paragraphs = if paragraphs.is_empty() {
        "<a:p><a:endParaRPr lang=\"en-US\"/></a:p>".to_string()
    } else {
        paragraphs
    };

    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr>{placeholder}</p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr wrap="square"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

fn group_header() -> &'static str {
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#
}

fn slide_master() -> String {
    format!(
        r#"{XML_DECL}<p:sldMaster {NS}><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>{}</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/><p:sldLayoutId id="2147483650" r:id="rId2"/></p:sldLayoutIdLst></p:sldMaster>"#,
        group_header()
    )
}

fn slide_layout(kind: &str, name: &str) -> String {
    format!(
        r#"{XML_DECL}<p:sldLayout {NS} type="{kind}" preserve="1"><p:cSld name="{name}"><p:spTree>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        group_header()
    )
}

fn theme() -> String {
    let colors = [
        ("dk1", r#"<a:sysClr val="windowText" lastClr="000000"/>"#),
        ("lt1", r#"<a:sysClr val="window" lastClr="FFFFFF"/>"#),
        ("dk2", r#"<a:srgbClr val="1F497D"/>"#),
        ("lt2", r#"<a:srgbClr val="EEECE1"/>"#),
        ("accent1", r#"<a:srgbClr val="4F81BD"/>"#),
        ("accent2", r#"<a:srgbClr val="C0504D"/>"#),
        ("accent3", r#"<a:srgbClr val="9BBB59"/>"#),
        ("accent4", r#"<a:srgbClr val="8064A2"/>"#),
        ("accent5", r#"<a:srgbClr val="4BACC6"/>"#),
        ("accent6", r#"<a:srgbClr val="F79646"/>"#),
        ("hlink", r#"<a:srgbClr val="0000FF"/>"#),
        ("folHlink", r#"<a:srgbClr val="800080"/>"#),
    ];
    let clr_scheme: String = colors
        .iter()
        .map(|(name, value)| format!("<a:{name}>{value}</a:{name}>"))
        .collect();
    let solid = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let fills = solid.repeat(3);
    let lines = format!(r#"<a:ln w="9525">{solid}</a:ln>"#).repeat(3);
    let effects = "<a:effectStyle><a:effectLst/></a:effectStyle>".repeat(3);
    let font = |face: &str| format!(r#"<a:latin typeface="{face}"/><a:ea typeface=""/><a:cs typeface=""/>"#);

    format!(
        r#"{XML_DECL}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office">{clr_scheme}</a:clrScheme><a:fontScheme name="Office"><a:majorFont>{major}</a:majorFont><a:minorFont>{minor}</a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst>{fills}</a:fillStyleLst><a:lnStyleLst>{lines}</a:lnStyleLst><a:effectStyleLst>{effects}</a:effectStyleLst><a:bgFillStyleLst>{fills}</a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#,
        major = font("Calibri"),
        minor = font("Calibri"),
    )
}

fn rels(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(r#"<Relationship Id="{id}" Type="{REL_TYPE}/{kind}" Target="{target}"/>"#)
        })
        .collect();
    format!(r#"{XML_DECL}<Relationships xmlns="{REL_NS}">{body}</Relationships>"#)
}

fn root_rels() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="{REL_TYPE}/extended-properties" Target="docProps/app.xml"/></Relationships>"#
    )
}

fn app_props(slides: usize) -> String {
    format!(
        r#"{XML_DECL}<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>crew-pipeline</Application><Slides>{slides}</Slides></Properties>"#
    )
}

fn core_props() -> String {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:creator>crew-pipeline</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified></cp:coreProperties>"#
    )
}

/// Run text as XML character data
fn xml_text(text: &str) -> String {
    // control characters are not allowed in XML 1.0
    let allowed: String = text.chars().filter(|&c| c >= ' ' || c == '\t').collect();
    escape(allowed.as_str()).into_owned()
}
