pub mod test_helpers {
    use std::cell::RefCell;
    use std::collections::{HashSet, VecDeque};
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::error::RenderFault;
    use crate::render::{RenderBackend, RenderCompletion, RenderJob, RenderOutput, RenderTicket};
    use crate::types::{Bitmap, PageDimensions};

    #[derive(Default)]
    struct Script {
        submitted: Vec<RenderJob>,
        cancelled: Vec<RenderTicket>,
        answered: HashSet<RenderTicket>,
        ready: VecDeque<RenderCompletion>,
        shut_down: bool,
    }

    /// Render backend driven by hand from tests.
    ///
    /// Nothing renders on its own: tests decide which tickets complete, in
    /// which order, and with what result. Clones share one script so a test
    /// can keep a handle after boxing the backend into a viewer.
    #[derive(Clone, Default)]
    pub struct ScriptedBackend {
        script: Rc<RefCell<Script>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every job submitted so far, in order
        pub fn submitted(&self) -> Vec<RenderJob> {
            self.script.borrow().submitted.clone()
        }

        pub fn submitted_pages(&self) -> Vec<usize> {
            self.script
                .borrow()
                .submitted
                .iter()
                .map(|j| j.ticket.page)
                .collect()
        }

        /// Forget submission history (answered tickets are kept)
        pub fn clear_history(&self) {
            let mut script = self.script.borrow_mut();
            script.submitted.clear();
            script.cancelled.clear();
        }

        pub fn cancelled(&self) -> Vec<RenderTicket> {
            self.script.borrow().cancelled.clone()
        }

        /// Most recent ticket submitted for `page`
        pub fn latest_ticket(&self, page: usize) -> Option<RenderTicket> {
            self.script
                .borrow()
                .submitted
                .iter()
                .rev()
                .find(|j| j.ticket.page == page)
                .map(|j| j.ticket)
        }

        /// Jobs neither answered nor cancelled
        pub fn outstanding(&self) -> Vec<RenderJob> {
            let script = self.script.borrow();
            script
                .submitted
                .iter()
                .filter(|j| {
                    !script.answered.contains(&j.ticket) && !script.cancelled.contains(&j.ticket)
                })
                .cloned()
                .collect()
        }

        /// Queue a successful render of a `width` x `height` page
        pub fn complete(&self, ticket: RenderTicket, width: f64, height: f64) {
            let scale = self.scale_of(ticket);
            let bitmap = Bitmap::solid(
                (width * scale).ceil().max(1.0) as u32,
                (height * scale).ceil().max(1.0) as u32,
                [255, 255, 255],
                scale,
            );
            self.answer(
                ticket,
                Ok(RenderOutput {
                    bitmap: Arc::new(bitmap),
                    intrinsic: PageDimensions::new(ticket.page, width, height),
                }),
            );
        }

        pub fn fail(&self, ticket: RenderTicket, fault: RenderFault) {
            self.answer(ticket, Err(fault));
        }

        /// Complete every outstanding job with the same page size.
        /// Returns how many were completed.
        pub fn complete_outstanding(&self, width: f64, height: f64) -> usize {
            let jobs = self.outstanding();
            for job in &jobs {
                self.complete(job.ticket, width, height);
            }
            jobs.len()
        }

        pub fn is_shut_down(&self) -> bool {
            self.script.borrow().shut_down
        }

        fn scale_of(&self, ticket: RenderTicket) -> f64 {
            self.script
                .borrow()
                .submitted
                .iter()
                .find(|j| j.ticket == ticket)
                .map_or(1.0, |j| j.scale)
        }

        fn answer(&self, ticket: RenderTicket, result: Result<RenderOutput, RenderFault>) {
            let mut script = self.script.borrow_mut();
            script.answered.insert(ticket);
            script.ready.push_back(RenderCompletion { ticket, result });
        }
    }

    impl RenderBackend for ScriptedBackend {
        fn submit(&mut self, job: RenderJob) {
            self.script.borrow_mut().submitted.push(job);
        }

        fn cancel(&mut self, ticket: RenderTicket) {
            self.script.borrow_mut().cancelled.push(ticket);
        }

        fn poll(&mut self) -> Vec<RenderCompletion> {
            self.script.borrow_mut().ready.drain(..).collect()
        }

        fn shutdown(&mut self) {
            self.script.borrow_mut().shut_down = true;
        }
    }
}
