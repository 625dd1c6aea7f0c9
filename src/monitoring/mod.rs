/*!
 * Monitoring
 * Structured logging for the supervisor
 */

mod tracer;

pub use tracer::{control_span, generate_op_id, init_tracing, record_control_result};
