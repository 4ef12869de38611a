/*
 * Copyright 2026 Stubwire Team
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::model::{Request, Response};

/// State of a single exchange: the inbound request and the response being built.
///
/// One context belongs to one exchange and is threaded by `&mut` through
/// matching and handling; it is never shared between exchanges.
#[derive(Debug)]
pub struct SessionContext {
    request: Request,
    response: Response,
}

impl SessionContext {
    pub fn new(request: impl Into<Request>) -> Self {
        Self {
            request: request.into(),
            response: Response::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Borrows the request and the response at the same time.
    pub fn split(&mut self) -> (&Request, &mut Response) {
        (&self.request, &mut self.response)
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
