pub mod downloader;
pub mod extractor;
pub mod folders;
pub mod fs_ops;
pub mod info;
pub mod ledger;
pub mod manager;
pub mod platform;
pub mod validator;

pub use downloader::HttpFetcher;
pub use extractor::ZipExtractor;
pub use info::{PackageDescriptor, PackageInfo, PackageType};
pub use ledger::{ContentPackagesFile, EntryState, LedgerEntry, LedgerFile};
pub use manager::{PackageManager, PackagesFileUpdate, UpdateArgs, VersionSelector};
pub use platform::Platform;
pub use validator::DescriptorValidator;
