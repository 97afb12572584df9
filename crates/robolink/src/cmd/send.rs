use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use robolink_link::{EventDispatcher, LinkHandle};
use robolink_packet::{
    Command, CommandKind, CorrelationId, EventPacket, MotorCommand, OutputPacket, ServoCommand,
};
use tracing::debug;

use crate::cmd::{parse_duration, start_link, SendArgs};
use crate::exit::{codec_error, link_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_send, OutputFormat, SendOutput, SendStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// How long a response may trail its acknowledgment within one read.
const RESPONSE_GRACE: Duration = Duration::from_millis(50);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let command = build_command(&args)?;
    let explicit_id = args
        .id
        .map(CorrelationId::new)
        .transpose()
        .map_err(|err| codec_error("--id", err))?;

    let link = start_link(
        &args.transport,
        &args.link,
        Arc::new(EventDispatcher::new()),
    )?;
    let handle = link.handle();

    let (tx, responses) = mpsc::channel();
    let id = match explicit_id {
        Some(id) => {
            if args.wait {
                handle.dispatcher().once(id, move |event| {
                    let _ = tx.send(event);
                });
            }
            handle.enqueue(OutputPacket::new(id, command))
        }
        None if args.wait => handle.send_with_response(command, move |event| {
            let _ = tx.send(event);
        }),
        None => handle.send(command),
    }
    .map_err(|err| link_error("send failed", err))?;
    debug!(correlation_id = %id, kind = command.kind().name(), "command queued");

    let deadline = Instant::now() + wait_timeout;
    let outcome = if args.wait {
        wait_for_answer(&handle, id, &responses, deadline)
    } else {
        wait_for_transmission(&handle, deadline).map(|()| (SendStatus::Sent, None))
    };

    let (status, response) = match outcome {
        Ok(answer) => answer,
        Err(err) => {
            // A lost connection explains the timeout better than the timeout itself.
            return Err(match link.shutdown() {
                Err(link_err) => link_error("link failed", link_err),
                Ok(()) => err,
            });
        }
    };

    print_send(
        &SendOutput {
            correlation_id: id,
            command: command.kind().name(),
            status,
            response,
        },
        format,
    );

    link.shutdown()
        .map_err(|err| link_error("link failed", err))?;
    Ok(SUCCESS)
}

/// Build the typed command from the flags.
pub fn build_command(args: &SendArgs) -> CliResult<Command> {
    let values = match args.values.as_slice() {
        [] => [0.0, 0.0],
        [a] => [*a, 0.0],
        [a, b] => [*a, *b],
        _ => return Err(CliError::new(USAGE, "--values takes at most two numbers")),
    };

    let motor = || MotorCommand {
        locked: args.lock,
        direction: args.direction.into(),
        data_type: args.data_type.into(),
        values,
    };
    let servo = || ServoCommand {
        angle: values[0],
        speed: values[1],
    };

    let kind = args.command.kind();
    if !takes_values(kind) && !args.values.is_empty() {
        return Err(CliError::new(
            USAGE,
            format!("{} takes no --values", kind.name()),
        ));
    }

    Ok(match kind {
        CommandKind::RightSteppingMotor => Command::RightSteppingMotor(motor()),
        CommandKind::LeftSteppingMotor => Command::LeftSteppingMotor(motor()),
        CommandKind::BothSteppingMotor => Command::BothSteppingMotor(motor()),
        CommandKind::MeasureDistance => Command::MeasureDistance,
        CommandKind::MeasureLineTracer => Command::MeasureLineTracer,
        CommandKind::MeasureNineAxis => Command::MeasureNineAxis,
        CommandKind::UpperServoMotor => Command::UpperServoMotor(servo()),
        CommandKind::BottomServoMotor => Command::BottomServoMotor(servo()),
    })
}

fn takes_values(kind: CommandKind) -> bool {
    !matches!(
        kind,
        CommandKind::MeasureDistance | CommandKind::MeasureLineTracer | CommandKind::MeasureNineAxis
    )
}

fn wait_for_transmission(handle: &LinkHandle, deadline: Instant) -> CliResult<()> {
    while handle.queued_len() > 0 {
        if !handle.is_running() {
            return Err(CliError::new(TIMEOUT, "link stopped before transmission"));
        }
        if Instant::now() >= deadline {
            let reason = if handle.is_sending_stopped() {
                "controller is holding transmission"
            } else {
                "timed out waiting for transmission"
            };
            return Err(CliError::new(TIMEOUT, reason));
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

fn wait_for_answer(
    handle: &LinkHandle,
    id: CorrelationId,
    responses: &Receiver<EventPacket>,
    deadline: Instant,
) -> CliResult<(SendStatus, Option<EventPacket>)> {
    loop {
        if let Ok(event) = responses.try_recv() {
            return Ok((SendStatus::Responded, Some(event)));
        }
        if !handle.is_pending(id) {
            // The entry is cleared just before a response is dispatched.
            return Ok(match responses.recv_timeout(RESPONSE_GRACE) {
                Ok(event) => (SendStatus::Responded, Some(event)),
                Err(_) => (SendStatus::Acknowledged, None),
            });
        }
        if !handle.is_running() {
            return Err(CliError::new(TIMEOUT, "link stopped before an answer arrived"));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("timed out waiting for an answer to {id}"),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
