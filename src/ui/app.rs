use tokio::sync::mpsc;

use crate::common::{ConnectionState, NetworkCommand, NetworkEvent};

use super::components::{connect_form, input_bar, message_list};
use super::state::{AppState, ConnectForm};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<NetworkCommand>,
    event_receiver: mpsc::Receiver<NetworkEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<NetworkCommand>,
        event_receiver: mpsc::Receiver<NetworkEvent>,
        form: ConnectForm,
    ) -> Self {
        Self {
            state: AppState::new(form),
            command_sender,
            event_receiver,
        }
    }

    fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, command: NetworkCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to network: {err}");
            if matches!(&err, mpsc::error::TrySendError::Closed(_)) {
                self.state.loading = false;
                self.state.error = Some("The network task has stopped.".to_string());
            }
        }
    }

    fn render_chat(&mut self, ui: &mut egui::Ui) {
        let Some(conversation) = self.state.conversation.clone() else {
            return;
        };

        ui.horizontal(|ui| {
            ui.heading(if conversation.is_broadcast() {
                "Broadcast".to_string()
            } else {
                conversation.recipient().to_string()
            });
            let (color, label) = match self.state.connection {
                ConnectionState::Connected => (egui::Color32::GREEN, "online"),
                ConnectionState::Reconnecting => (egui::Color32::YELLOW, "reconnecting..."),
                ConnectionState::Connecting => (egui::Color32::YELLOW, "connecting..."),
                ConnectionState::Disconnected => (egui::Color32::RED, "offline"),
            };
            ui.colored_label(color, label);
            if ui.button("Leave").clicked() {
                self.state.leave_chat();
                self.send_command(NetworkCommand::Disconnect);
            }
        });
        ui.label(egui::RichText::new(format!("Signed in as {}", conversation.user())).weak());
        ui.separator();

        if let Some(reason) = self.state.send_error.clone() {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::RED, reason);
                if ui.small_button("Dismiss").clicked() {
                    self.state.send_error = None;
                }
            });
        }

        let input_height = 36.0;
        let list_height = (ui.available_height() - input_height).max(0.0);
        ui.allocate_ui(egui::vec2(ui.available_width(), list_height), |ui| {
            message_list::render(
                ui,
                &self.state.messages,
                conversation.user(),
                &mut self.state.user_colors,
            );
        });

        ui.separator();
        if let Some(content) = input_bar::render(ui, &mut self.state) {
            self.send_command(NetworkCommand::SendMessage(content));
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.in_chat() {
                self.render_chat(ui);
            } else if let Some((user, recipient)) = connect_form::render(ui, &mut self.state) {
                self.send_command(NetworkCommand::Connect { user, recipient });
            }
        });

        ctx.request_repaint();
    }
}
