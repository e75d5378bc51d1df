pub mod boot;
pub mod extractor;
pub mod injector;
pub mod packager;

pub use extractor::{ImageExtractor, LoopMountExtractor, XorrisoExtractor};
pub use injector::InstallerInjector;
pub use packager::{ImageAssembler, IsoPackager};
