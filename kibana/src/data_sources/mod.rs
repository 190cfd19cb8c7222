pub mod data_source_connector_types;

pub use data_source_connector_types::ConnectorTypesDataSource;
