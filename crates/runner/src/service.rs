use serde_json::Value;
use verirun_service_client::{ServiceClient, ServiceError, SubmitRequest};

/// The remote calls the run controller makes.
pub trait ExecutionService {
    fn submit_run(&self, request: &SubmitRequest) -> Result<Value, ServiceError>;
    fn get_json(&self, path: &str) -> Result<Value, ServiceError>;
}

impl ExecutionService for ServiceClient {
    fn submit_run(&self, request: &SubmitRequest) -> Result<Value, ServiceError> {
        ServiceClient::submit_run(self, request)
    }

    fn get_json(&self, path: &str) -> Result<Value, ServiceError> {
        ServiceClient::get_json(self, path)
    }
}
