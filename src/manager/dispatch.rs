//! Work items submitted to the recv and send pools.

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{Request, Response};
use crate::manager::client::Client;
use crate::manager::server::Shared;
use crate::pool::Task;

/// Recv-pool work item. Hands one inbound request to the user's
/// `RequestHandler::process`.
pub(crate) struct ProcessRequest {
    shared: Arc<Shared>,
    request: Request,
}

impl ProcessRequest {
    pub(crate) fn new(shared: Arc<Shared>, request: Request) -> Self {
        Self { shared, request }
    }
}

#[async_trait]
impl Task for ProcessRequest {
    async fn run(self: Box<Self>, trace_id: &str, _worker_id: usize) {
        let this = *self;
        this.shared.request_handler().process(trace_id, this.request).await;
    }
}

/// Send-pool work item. Writes one response to its client and then runs
/// the completion callback, write failure or not.
pub(crate) struct WriteResponse {
    shared: Arc<Shared>,
    client: Arc<Client>,
    response: Response,
}

impl WriteResponse {
    pub(crate) fn new(shared: Arc<Shared>, client: Arc<Client>, response: Response) -> Self {
        Self { shared, client, response }
    }
}

#[async_trait]
impl Task for WriteResponse {
    async fn run(self: Box<Self>, trace_id: &str, _worker_id: usize) {
        let this = *self;
        let mut response = this.response;
        let complete = response.complete.take();

        {
            let mut writer = this.client.writer().await;
            if let Err(e) = this
                .shared
                .response_handler()
                .write(trace_id, &response, &mut *writer)
                .await
            {
                this.shared
                    .event(trace_id, "write", &format!("ERROR : {} : {e}", response.addr));
            }
        }

        if let Some(complete) = complete {
            complete(&response);
        }
    }
}
