//! USB device and CDC-ACM interface tasks.

use embassy_futures::select::{select3, Either3};
use embassy_usb::class::cdc_acm::{self, ControlChanged, ParityType};
use embassy_usb::driver::Driver;
use embassy_usb::UsbDevice;

use crate::bridge::{BridgeEvents, ControlTracker, LineCoding, LineState, Parity, StopBits};
use crate::usb::cdc_io::{run_from_host, run_to_host, CdcReader, CdcWriter, PendingPacket};
use crate::usb::CdcFifo;

/// Task that services the USB device (enumeration and control requests).
pub async fn usb_device_task<D: Driver<'static>>(mut device: UsbDevice<'static, D>) -> ! {
    device.run().await
}

fn line_coding_from(coding: &cdc_acm::LineCoding) -> LineCoding {
    LineCoding {
        baud_rate: coding.data_rate(),
        data_bits: coding.data_bits(),
        parity: match coding.parity_type() {
            ParityType::None => Parity::None,
            ParityType::Odd => Parity::Odd,
            ParityType::Even => Parity::Even,
            ParityType::Mark => Parity::Mark,
            ParityType::Space => Parity::Space,
        },
        stop_bits: match coding.stop_bits() {
            cdc_acm::StopBits::One => StopBits::One,
            cdc_acm::StopBits::OnePointFive => StopBits::OnePointFive,
            cdc_acm::StopBits::Two => StopBits::Two,
        },
    }
}

/// Task that connects one CDC-ACM interface to its FIFO.
///
/// While the host has the interface configured this pumps packets in both
/// directions and turns control requests into bridge events. A control
/// request interrupts the pumps, which keep any packet they were holding
/// in `from_host`/`to_host` and resume with it. Losing an endpoint marks the
/// FIFO disconnected until the host comes back.
pub async fn cdc_port_task<D: Driver<'static>, const N: usize>(
    interface: u8,
    mut reader: CdcReader<'static, D>,
    mut writer: CdcWriter<'static, D>,
    control: ControlChanged<'static>,
    fifo: &'static CdcFifo<N>,
    events: &'static BridgeEvents,
) -> ! {
    let mut tracker = ControlTracker::new(interface, line_coding_from(&reader.line_coding()));
    let mut from_host = PendingPacket::new();
    let mut to_host = PendingPacket::new();

    loop {
        reader.wait_connection().await;
        writer.wait_connection().await;
        fifo.set_connected(true);
        log::info!("CDC{}: endpoints enabled", interface);

        loop {
            let event = select3(
                run_from_host(&mut reader, fifo, &mut from_host),
                run_to_host(&mut writer, fifo, &mut to_host),
                control.control_changed(),
            )
            .await;

            match event {
                Either3::First(e) | Either3::Second(e) => {
                    log::info!("CDC{}: endpoint lost ({:?})", interface, e);
                    break;
                }
                Either3::Third(()) => {
                    let state = LineState {
                        dtr: reader.dtr(),
                        rts: reader.rts(),
                    };
                    tracker.apply(line_coding_from(&reader.line_coding()), state, events);
                }
            }
        }

        fifo.set_connected(false);
        from_host.clear();
        to_host.clear();
        tracker.reset_line_state();
    }
}
