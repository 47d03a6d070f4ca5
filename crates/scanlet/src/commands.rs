//! The command table, and one typed proxy method per command.
//!
//! Both are expanded from the same declarations so the manifest a dynamic
//! caller checks against can never drift from the typed surface.
//!
//! Configuration records (scanner options, PDF/TIFF settings, filters...)
//! are opaque JSON and pass through untouched.

use serde_json::Value;

use crate::handle::{AnyObjectId, ObjectId, kinds};
use crate::manifest::{CommandSpec, FromReply, IntoArg};
use crate::payload::ImageBuffer;
use crate::proxy::{CommandProxy, PendingCall};

macro_rules! commands {
    ($(
        $(#[$doc:meta])*
        fn $method:ident = $wire:literal ($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
    )*) => {
        /// Every command the compute context understands.
        pub static COMMANDS: &[CommandSpec] = &[$(
            CommandSpec {
                name: $wire,
                params: &[$(<$ty as IntoArg>::KIND),*],
                returns: <$ret as FromReply>::RETURNS,
            },
        )*];

        impl CommandProxy<'_> {
            $(
                $(#[$doc])*
                pub fn $method(&self, $($arg: $ty),*) -> PendingCall<$ret> {
                    const SPEC: CommandSpec = CommandSpec {
                        name: $wire,
                        params: &[$(<$ty as IntoArg>::KIND),*],
                        returns: <$ret as FromReply>::RETURNS,
                    };
                    self.invoke(&SPEC, vec![$(IntoArg::into_arg($arg)),*])
                }
            )*
        }
    };
}

/// Look up a command by its wire name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

commands! {
    /// Load the engine and apply the license. Must succeed before any other
    /// command is accepted; [`crate::Bridge::connect`] issues it for you.
    fn initialize = "initialize"(
        license_key: Option<&str>,
        engine_path: Option<&str>,
        app_id: Option<&str>,
        cdn_path: Option<&str>,
        options: Value,
    ) -> Value;

    fn get_license_info = "getLicenseInfo"() -> Value;

    /// Encode to JPEG. Under [`crate::Marshalling::Transfer`] `image` is
    /// detached at dispatch.
    fn encode_jpeg = "encodeJpeg"(image: &ImageBuffer) -> Vec<u8>;

    /// One-shot document detection. Under [`crate::Marshalling::Transfer`]
    /// `image` is detached at dispatch.
    fn detect_document = "detectDocument"(image: &ImageBuffer, options: Value) -> Value;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn detect_and_crop_document = "detectAndCropDocument"(image: &ImageBuffer) -> Value;

    fn create_document_scanner = "createDocumentScanner"(options: Value)
        -> ObjectId<kinds::DocumentScanner>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn document_scanner_detect = "documentScannerDetect"(
        scanner: &ObjectId<kinds::DocumentScanner>,
        image: &ImageBuffer,
    ) -> Value;

    fn parse_barcode_document = "parseBarcodeDocument"(formats: Value, data: &str) -> Value;

    fn create_barcode_scanner = "createBarcodeScanner"(options: Value)
        -> ObjectId<kinds::BarcodeScanner>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn scan_barcodes = "scanBarcodes"(
        scanner: &ObjectId<kinds::BarcodeScanner>,
        image: &ImageBuffer,
    ) -> Value;

    /// Start a PDF. Pages are added with [`CommandProxy::add_page_to_pdf`]
    /// and the document is produced by [`CommandProxy::complete_pdf`]. The
    /// context handle stays live after completion; release it with
    /// [`CommandProxy::release`].
    fn begin_pdf = "beginPdf"(options: Value) -> ObjectId<kinds::PdfGenerationContext>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn add_page_to_pdf = "addPageToPdf"(
        pdf: &ObjectId<kinds::PdfGenerationContext>,
        image: &ImageBuffer,
    ) -> ();

    fn complete_pdf = "completePdf"(pdf: &ObjectId<kinds::PdfGenerationContext>) -> Vec<u8>;

    /// Same lifecycle as [`CommandProxy::begin_pdf`].
    fn begin_tiff = "beginTiff"(options: Value) -> ObjectId<kinds::TiffGenerationContext>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn add_page_to_tiff = "addPageToTiff"(
        tiff: &ObjectId<kinds::TiffGenerationContext>,
        image: &ImageBuffer,
        binarization: Value,
    ) -> scanlet_bridge::WireValue;

    fn complete_tiff = "completeTiff"(tiff: &ObjectId<kinds::TiffGenerationContext>) -> Vec<u8>;

    fn create_mrz_scanner = "createMRZScanner"(configuration: Value) -> ObjectId<kinds::MrzScanner>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn scan_mrz = "scanMRZ"(scanner: &ObjectId<kinds::MrzScanner>, image: &ImageBuffer) -> Value;

    /// Free an engine-resident object. Prefer [`CommandProxy::release`],
    /// which consumes the typed handle.
    fn release_object = "releaseObject"(object: AnyObjectId) -> ();

    fn create_ocr_engine = "createOcrEngine"() -> ObjectId<kinds::OcrEngine>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn perform_ocr = "performOcr"(engine: &ObjectId<kinds::OcrEngine>, image: &ImageBuffer) -> Value;

    fn create_text_pattern_scanner = "createTextPatternScanner"(configuration: Value)
        -> ObjectId<kinds::TextPatternScanner>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn scan_text_line = "scanTextLine"(
        scanner: &ObjectId<kinds::TextPatternScanner>,
        image: &ImageBuffer,
    ) -> Value;

    /// Drop frames accumulated by a live text pattern scanner.
    fn clean_text_line_scanning_queue = "cleanTextLineScanningQueue"(
        scanner: &ObjectId<kinds::TextPatternScanner>,
    ) -> ();

    fn create_vin_scanner = "createVinScanner"(configuration: Value) -> ObjectId<kinds::VinScanner>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn scan_vin = "scanVin"(scanner: &ObjectId<kinds::VinScanner>, image: &ImageBuffer) -> Value;

    fn clean_vin_scanning_queue = "cleanVinScanningQueue"(scanner: &ObjectId<kinds::VinScanner>) -> ();

    fn create_document_quality_analyzer = "createDocumentQualityAnalyzer"(options: Value)
        -> ObjectId<kinds::DocumentQualityAnalyzer>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn document_quality_analyzer_analyze = "documentQualityAnalyzerAnalyze"(
        analyzer: &ObjectId<kinds::DocumentQualityAnalyzer>,
        image: &ImageBuffer,
    ) -> Value;

    /// Returns a new raw image. Under [`crate::Marshalling::Transfer`]
    /// `image` is detached at dispatch.
    fn image_apply_filter = "imageApplyFilter"(image: &ImageBuffer, filter: Value) -> ImageBuffer;

    /// Crop to a four-point polygon. Under [`crate::Marshalling::Transfer`]
    /// `image` is detached at dispatch.
    fn image_crop = "imageCrop"(image: &ImageBuffer, polygon: Value) -> ImageBuffer;

    /// Scale so the longer side is `destination_size`. Under
    /// [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn image_resize = "imageResize"(image: &ImageBuffer, destination_size: u32) -> ImageBuffer;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn image_rotate = "imageRotate"(image: &ImageBuffer, rotation: &str) -> ImageBuffer;

    fn document_data_extractor_create = "documentDataExtractorCreate"(parameters: Value)
        -> ObjectId<kinds::DocumentDataExtractor>;

    /// Under [`crate::Marshalling::Transfer`] `image` is detached at dispatch.
    fn document_data_extractor_extract = "documentDataExtractorExtract"(
        extractor: &ObjectId<kinds::DocumentDataExtractor>,
        image: &ImageBuffer,
        parameters: Value,
    ) -> Value;

    /// Engine version string.
    fn version = "version"() -> String;

    fn has_module_function = "__hasModuleFunction"(function_name: &str) -> Value;

    /// Escape hatch into engine functions not covered by the table above.
    fn call_module_function = "__callModuleFunction"(function_name: &str, args: Value) -> Value;
}
