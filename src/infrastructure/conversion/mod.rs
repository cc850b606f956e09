mod http_converter;
mod mock_converter;

pub use http_converter::HttpConverter;
pub use mock_converter::MockConverter;
