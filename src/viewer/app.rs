//! egui window painting a projection of the device layout.

use eframe::egui;
use glam::{DVec2, DVec3};

use super::{device_table, Projection, ViewTransform};
use crate::geometry::Geometry;

const DEVICE_COLORS: [egui::Color32; 4] = [
    egui::Color32::from_rgb(230, 120, 60),
    egui::Color32::from_rgb(80, 160, 230),
    egui::Color32::from_rgb(110, 200, 110),
    egui::Color32::from_rgb(200, 110, 200),
];

/// The native geometry viewer window.
pub struct GeometryViewerApp {
    geometry: Geometry,
    projection: Projection,
    show_transducers: bool,
    table: String,
}

impl GeometryViewerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, geometry: Geometry) -> Self {
        let table = device_table(&geometry);
        Self {
            geometry,
            projection: Projection::Top,
            show_transducers: true,
            table,
        }
    }

    /// Launch the window. Blocks until it is closed.
    pub fn run(geometry: Geometry, width: u32, height: u32, vsync: bool) -> eframe::Result {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title("focaltrack geometry")
                .with_inner_size([width as f32, height as f32]),
            vsync,
            ..Default::default()
        };

        eframe::run_native(
            "focaltrack-geometry",
            options,
            Box::new(move |cc| Ok(Box::new(Self::new(cc, geometry)))),
        )
    }

    fn paint(&self, ui: &mut egui::Ui) {
        let size = ui.available_size();
        let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, egui::Color32::from_gray(24));

        let view = ViewTransform::fit(
            &self.geometry,
            self.projection,
            DVec2::new(rect.width() as f64, rect.height() as f64),
            24.0,
        );
        let to_pos = |p: DVec3| {
            let s = view.to_screen(self.projection.project(p));
            rect.min + egui::vec2(s.x as f32, s.y as f32)
        };

        let radius = (view.scale() * 4.0).clamp(1.0, 6.0) as f32;
        for device in self.geometry.devices() {
            let color = DEVICE_COLORS[device.idx() % DEVICE_COLORS.len()];

            let outline: Vec<egui::Pos2> = device.corners().iter().map(|c| to_pos(*c)).collect();
            painter.add(egui::Shape::closed_line(outline, egui::Stroke::new(1.5, color)));

            if self.show_transducers {
                for t in device.transducers() {
                    painter.circle_filled(to_pos(*t), radius, color.gamma_multiply(0.6));
                }
            }

            painter.text(
                to_pos(device.center()),
                egui::Align2::CENTER_CENTER,
                device.idx().to_string(),
                egui::FontId::proportional(16.0),
                egui::Color32::WHITE,
            );
        }

        painter.circle_stroke(
            to_pos(self.geometry.center()),
            5.0,
            egui::Stroke::new(2.0, egui::Color32::YELLOW),
        );
    }
}

impl eframe::App for GeometryViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.label("focaltrack");
                ui.separator();
                for projection in Projection::ALL {
                    ui.selectable_value(&mut self.projection, projection, projection.label());
                }
                ui.separator();
                ui.checkbox(&mut self.show_transducers, "Transducers");
            });
        });

        egui::TopBottomPanel::bottom("devices").show(ctx, |ui| {
            ui.monospace(&self.table);
        });

        egui::CentralPanel::default().show(ctx, |ui| self.paint(ui));
    }
}
